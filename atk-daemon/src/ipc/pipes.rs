//! Named-pipe request/response transport
//!
//! A blocking reader worker consumes `atk.cmd` one line at a time and feeds
//! parsed requests to the control task; a writer worker drains a bounded
//! outbound queue to `atk.resp`. Responses suspend the sender when the
//! queue is full; events are lossy and dropped on overflow. A missing or
//! vanished reader on the response pipe is recoverable: the affected lines
//! are dropped and the writer keeps going.

use atk_common::error::{Error, Result};
use atk_common::protocol::{self, Event, EventType, Message, Request, Response};
use crate::ipc::{CMD_PIPE, RESP_PIPE};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Outbound queue capacity (responses and events combined)
const OUTBOUND_CAPACITY: usize = 256;

/// Maximum lines written per pipe open
const WRITE_BATCH: usize = 64;

/// Handle for writing responses and events to the response pipe.
///
/// Cloneable; the session keeps one to emit events, the control loop keeps
/// one to send responses.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
    subscribed: Arc<AtomicBool>,
}

impl Outbound {
    /// Create an outbound handle and the queue the writer worker drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                subscribed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Send a response. Suspends when the outbound queue is full; responses
    /// are never dropped while the writer is alive.
    pub async fn send_response(&self, response: &Response) {
        if self.tx.send(response.serialize()).await.is_err() {
            warn!("Outbound queue closed, dropping response {}", response.id);
        }
    }

    /// Emit an event to subscribers. Does nothing until a client has
    /// subscribed; drops the event when the outbound queue is full.
    pub fn send_event(&self, event_type: EventType, data: Value) {
        if !self.subscribed.load(Ordering::Relaxed) {
            return;
        }
        let event = Event::new(event_type, data);
        match self.tx.try_send(event.serialize()) {
            Ok(()) => trace!("Emitted event {}", event_type),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Outbound queue full, dropping event {}", event_type);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Outbound queue closed, dropping event {}", event_type);
            }
        }
    }

    /// Mark the session as having at least one event subscriber.
    pub fn set_subscribed(&self) {
        self.subscribed.store(true, Ordering::Relaxed);
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscribed.load(Ordering::Relaxed)
    }
}

/// The daemon's pipe pair plus reader/writer workers.
pub struct PipeTransport {
    cmd_pipe: PathBuf,
    resp_pipe: PathBuf,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PipeTransport {
    /// Create both pipes in `runtime_dir` and start the reader and writer
    /// workers. Returns the transport handle, the request stream for the
    /// control task, and the outbound handle.
    pub fn start(runtime_dir: &Path) -> Result<(Self, mpsc::Receiver<Request>, Outbound)> {
        fs::create_dir_all(runtime_dir)?;
        let cmd_pipe = runtime_dir.join(CMD_PIPE);
        let resp_pipe = runtime_dir.join(RESP_PIPE);

        for pipe in [&cmd_pipe, &resp_pipe] {
            if pipe.exists() {
                fs::remove_file(pipe)?;
            }
            mkfifo(pipe.as_path(), Mode::S_IRUSR | Mode::S_IWUSR)
                .map_err(|e| Error::Internal(format!("mkfifo {}: {}", pipe.display(), e)))?;
        }
        info!("Created pipes in {}", runtime_dir.display());

        let (req_tx, req_rx) = mpsc::channel(64);
        let (outbound, out_rx) = Outbound::channel(OUTBOUND_CAPACITY);

        let reader = tokio::spawn(read_loop(cmd_pipe.clone(), req_tx, outbound.clone()));
        let writer = tokio::spawn(write_loop(resp_pipe.clone(), out_rx));

        Ok((
            Self {
                cmd_pipe,
                resp_pipe,
                reader,
                writer,
            },
            req_rx,
            outbound,
        ))
    }

    /// Abort the workers and unlink both pipes.
    pub fn shutdown(self) {
        self.reader.abort();
        self.writer.abort();
        let _ = fs::remove_file(&self.cmd_pipe);
        let _ = fs::remove_file(&self.resp_pipe);
        info!("Removed pipes");
    }
}

/// Reader worker: block on the command pipe, parse lines, hand requests to
/// the control task. Malformed lines get an immediate Transport failure
/// response correlated to whatever id the line carried.
async fn read_loop(cmd_pipe: PathBuf, req_tx: mpsc::Sender<Request>, outbound: Outbound) {
    loop {
        let path = cmd_pipe.clone();
        let lines = match tokio::task::spawn_blocking(move || read_open_lines(&path)).await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Pipe reader worker failed: {}", e);
                return;
            }
        };

        for line in lines {
            match protocol::parse_message(&line) {
                Ok(Message::Request(request)) => {
                    trace!("Request {} ({})", request.cmd, request.id);
                    if req_tx.send(request).await.is_err() {
                        return; // control task gone, daemon is shutting down
                    }
                }
                Ok(_) => {
                    debug!("Ignoring non-request message on command pipe");
                }
                Err(e) => {
                    let id = protocol::request_id_of(&line);
                    outbound
                        .send_response(&Response::failure(id, e.to_info()))
                        .await;
                }
            }
        }
    }
}

/// One open/read cycle on the command FIFO. Opening blocks until a client
/// connects; EOF means every writer has closed, so the pipe is reopened on
/// the next cycle.
fn read_open_lines(path: &Path) -> Vec<String> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            warn!("Failed to open command pipe: {}", e);
            std::thread::sleep(std::time::Duration::from_millis(100));
            return Vec::new();
        }
    };

    BufReader::new(file)
        .lines()
        .map_while(|line| line.ok())
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Writer worker: drain the outbound queue to the response pipe, batching
/// pending lines into one open. Broken pipes drop the batch and continue.
async fn write_loop(resp_pipe: PathBuf, mut rx: mpsc::Receiver<String>) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while batch.len() < WRITE_BATCH {
            match rx.try_recv() {
                Ok(line) => batch.push(line),
                Err(_) => break,
            }
        }

        let path = resp_pipe.clone();
        let result = tokio::task::spawn_blocking(move || write_batch(&path, &batch)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Dropped outbound batch: {}", e),
            Err(e) => {
                warn!("Pipe writer worker failed: {}", e);
                return;
            }
        }
    }
}

/// Write a batch of lines to the response FIFO. Opening blocks until a
/// reader connects; EPIPE mid-write is reported as a recoverable error.
fn write_batch(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).open(path)?;
    for line in lines {
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;
    }
    file.flush()
}
