//! Playback session controller
//!
//! Serialises all command handling: exactly one command runs at a time on
//! the control task. Each handler validates its arguments, mutates queue
//! and engine state, emits events, and returns a response payload. The
//! session also reacts to natural track-end notices from the engine and
//! drives the 1 Hz position ticker.

use atk_common::error::{Error, Result};
use atk_common::human_time::{self, SeekPosition};
use atk_common::protocol::{EventType, Request, Response};
use atk_common::types::{PlaybackState, RateMode, RepeatMode, StatusInfo, TrackInfo};
use crate::audio::{decoder, is_supported_format, output};
use crate::engine::Engine;
use crate::ipc::Outbound;
use crate::playlist;
use crate::queue::Queue;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Default volume applied to a fresh session
const DEFAULT_VOLUME: i64 = 80;

/// Persisted file name under the data directory
const STATE_FILE: &str = "session.json";

/// The persisted subset of session state. Position is deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub queue: Vec<String>,
    pub current_index: usize,
    pub shuffle: bool,
    pub shuffle_order: Vec<usize>,
    pub repeat: RepeatMode,
    pub volume: u8,
    pub rate: f32,
}

/// One playback session: queue, transport state, and command handlers.
pub struct Session {
    engine: Arc<Engine>,
    queue: Queue,
    state: PlaybackState,
    /// Last known position in seconds, refreshed on pause/seek/tick
    position: f64,
    data_dir: PathBuf,
    outbound: Outbound,
    shutdown: Arc<Notify>,
}

impl Session {
    pub fn new(
        engine: Arc<Engine>,
        outbound: Outbound,
        shutdown: Arc<Notify>,
        data_dir: PathBuf,
    ) -> Self {
        engine.set_volume(DEFAULT_VOLUME);
        Self {
            engine,
            queue: Queue::new(),
            state: PlaybackState::Stopped,
            position: 0.0,
            data_dir,
            outbound,
            shutdown,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// Dispatch one request to its handler and wrap the outcome in a
    /// response. Handler errors become failure responses; the control task
    /// itself never dies on one.
    pub async fn handle_request(&mut self, request: Request) -> Response {
        let Request { id, cmd, args, .. } = request;
        match self.dispatch(&cmd, &args).await {
            Ok(data) => Response::success(id, data),
            Err(e) => {
                if matches!(e, Error::Internal(_)) {
                    error!("Command {} failed: {}", cmd, e);
                } else {
                    debug!("Command {} rejected: {}", cmd, e);
                }
                Response::failure(id, e.to_info())
            }
        }
    }

    async fn dispatch(&mut self, cmd: &str, args: &Map<String, Value>) -> Result<Value> {
        match cmd {
            "ping" => Ok(json!({"pong": true})),
            "status" => self.cmd_status().await,
            "play" => self.cmd_play(args).await,
            "pause" => self.cmd_pause(),
            "stop" => self.cmd_stop().await,
            "next" => self.cmd_next().await,
            "prev" => self.cmd_prev().await,
            "seek" => self.cmd_seek(args),
            "volume" => self.cmd_volume(args),
            "rate" => self.cmd_rate(args),
            "add" => self.cmd_add(args),
            "remove" => self.cmd_remove(args).await,
            "move" => self.cmd_move(args),
            "clear" => self.cmd_clear().await,
            "queue" => self.cmd_queue().await,
            "jump" => self.cmd_jump(args).await,
            "shuffle" => self.cmd_shuffle(args),
            "repeat" => self.cmd_repeat(args),
            "info" => self.cmd_info(args).await,
            "subscribe" => {
                self.outbound.set_subscribed();
                Ok(json!({"subscribed": true}))
            }
            "save" => self.cmd_save(args).await,
            "load" => self.cmd_load(args).await,
            "playlists" => self.cmd_playlists().await,
            "devices" => self.cmd_devices().await,
            "set-device" => self.cmd_set_device(args).await,
            "shutdown" => {
                info!("Shutdown requested over IPC");
                self.shutdown.notify_one();
                Ok(json!({"shutting_down": true}))
            }
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }

    // ── Playback control ────────────────────────────────────────────────

    async fn cmd_play(&mut self, args: &Map<String, Value>) -> Result<Value> {
        if let Some(file) = opt_str_arg(args, "file") {
            if !is_supported_format(&file) {
                return Err(Error::UnsupportedFormat(file));
            }
            self.queue.add(file);
            let index = self.queue.len() - 1;
            self.queue.jump(index);
            self.emit_queue_updated();
            self.play_current().await;
        } else if self.state == PlaybackState::Paused {
            self.engine.unpause().await?;
            self.state = PlaybackState::Playing;
            self.emit(EventType::PlaybackStarted, json!({}));
        } else if self.state == PlaybackState::Stopped && !self.queue.is_empty() {
            self.play_current().await;
        }

        Ok(json!({"state": self.state}))
    }

    fn cmd_pause(&mut self) -> Result<Value> {
        if self.state == PlaybackState::Playing {
            self.engine.pause();
            self.state = PlaybackState::Paused;
            self.position = self.engine.position();
            self.emit(EventType::PlaybackPaused, json!({"position": self.position}));
        }
        Ok(json!({"state": self.state}))
    }

    async fn cmd_stop(&mut self) -> Result<Value> {
        self.engine.stop().await;
        self.state = PlaybackState::Stopped;
        self.position = 0.0;
        self.emit(EventType::PlaybackStopped, json!({}));
        Ok(json!({"state": self.state}))
    }

    async fn cmd_next(&mut self) -> Result<Value> {
        if self.queue.advance() {
            self.play_current().await;
            Ok(json!({"queue_position": self.queue.current_index()}))
        } else {
            Ok(json!({"error": "End of queue"}))
        }
    }

    async fn cmd_prev(&mut self) -> Result<Value> {
        if self.queue.previous() {
            self.play_current().await;
            Ok(json!({"queue_position": self.queue.current_index()}))
        } else {
            Ok(json!({"error": "Start of queue"}))
        }
    }

    fn cmd_seek(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let target = match args.get("pos") {
            Some(Value::Number(n)) => {
                let secs = n
                    .as_f64()
                    .ok_or_else(|| Error::InvalidArgs("Invalid seek position".to_string()))?;
                SeekPosition::Absolute(secs)
            }
            Some(Value::String(s)) => human_time::parse_position(s)?,
            _ => return Err(Error::InvalidArgs("Position required".to_string())),
        };

        let resolved = target.resolve(self.engine.position());
        self.engine.seek(resolved);
        self.position = resolved;
        Ok(json!({"position": resolved}))
    }

    fn cmd_volume(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let level = args
            .get("level")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::InvalidArgs("Level required".to_string()))?;
        let volume = self.engine.set_volume(level);
        Ok(json!({"volume": volume}))
    }

    fn cmd_rate(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let speed = args
            .get("speed")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::InvalidArgs("Speed required".to_string()))?;

        let mode = match args.get("mode") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value::<RateMode>(value.clone())
                    .map_err(|_| Error::InvalidArgs(format!("Invalid rate mode: {}", value)))?,
            ),
        };

        let rate = self.engine.set_rate(speed, mode);
        Ok(json!({"rate": rate}))
    }

    // ── Queue management ────────────────────────────────────────────────

    fn cmd_add(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let uri =
            opt_str_arg(args, "uri").ok_or_else(|| Error::InvalidArgs("URI required".to_string()))?;
        if !is_supported_format(&uri) {
            return Err(Error::UnsupportedFormat(uri));
        }

        let length = self.queue.add(uri);
        self.emit_queue_updated();
        Ok(json!({"queue_length": length}))
    }

    async fn cmd_remove(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let index = index_arg(args, "index")?;
        let outcome = self
            .queue
            .remove(index)
            .ok_or_else(|| Error::InvalidIndex(format!("Invalid queue index: {}", index)))?;

        if outcome.was_current && self.state == PlaybackState::Playing {
            if outcome.current_still_valid {
                self.play_current().await;
            } else {
                self.engine.stop().await;
                self.state = PlaybackState::Stopped;
                self.position = 0.0;
            }
        }

        self.emit_queue_updated();
        Ok(json!({"removed": outcome.uri}))
    }

    fn cmd_move(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let from = index_arg(args, "from")?;
        let to = index_arg(args, "to")?;

        if from >= self.queue.len() {
            return Err(Error::InvalidIndex(format!("Invalid from index: {}", from)));
        }
        if to >= self.queue.len() {
            return Err(Error::InvalidIndex(format!("Invalid to index: {}", to)));
        }

        self.queue.move_track(from, to);
        self.emit_queue_updated();
        Ok(json!({"queue_position": self.queue.current_index()}))
    }

    async fn cmd_clear(&mut self) -> Result<Value> {
        self.clear_internal().await;
        self.emit_queue_updated();
        Ok(json!({"cleared": true}))
    }

    async fn clear_internal(&mut self) {
        self.engine.stop().await;
        self.state = PlaybackState::Stopped;
        self.position = 0.0;
        self.queue.clear();
    }

    async fn cmd_queue(&mut self) -> Result<Value> {
        let tracks = self.probed_track_infos(self.queue.tracks().to_vec()).await;
        Ok(json!({
            "tracks": tracks,
            "current_index": self.queue.current_index(),
        }))
    }

    async fn cmd_jump(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let index = index_arg(args, "index")?;
        if !self.queue.jump(index) {
            return Err(Error::InvalidIndex(format!(
                "Invalid queue index: {}",
                index
            )));
        }
        self.play_current().await;
        Ok(json!({"queue_position": self.queue.current_index()}))
    }

    fn cmd_shuffle(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let enabled = args
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.queue.set_shuffle(enabled);
        Ok(json!({"shuffle": enabled}))
    }

    fn cmd_repeat(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let mode_value = args.get("mode").cloned().unwrap_or(json!("none"));
        let mode = serde_json::from_value::<RepeatMode>(mode_value.clone())
            .map_err(|_| Error::InvalidArgs(format!("Invalid repeat mode: {}", mode_value)))?;
        self.queue.set_repeat(mode);
        Ok(json!({"repeat": mode}))
    }

    // ── Status & info ───────────────────────────────────────────────────

    async fn cmd_status(&mut self) -> Result<Value> {
        let track = match self.queue.current_track() {
            Some(uri) => Some(self.track_info(uri.to_string()).await),
            None => None,
        };

        let position = if self.state == PlaybackState::Stopped {
            0.0
        } else {
            self.engine.position()
        };

        let status = StatusInfo {
            state: self.state,
            duration: track.as_ref().and_then(|t| t.duration).unwrap_or(0.0),
            track,
            position,
            volume: self.engine.volume(),
            shuffle: self.queue.shuffle_enabled(),
            repeat: self.queue.repeat(),
            queue_length: self.queue.len(),
            queue_position: self.queue.current_index(),
            rate: self.engine.rate(),
        };

        serde_json::to_value(status).map_err(|e| Error::Internal(e.to_string()))
    }

    async fn cmd_info(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let index = match args.get("index") {
            None | Some(Value::Null) => self.queue.current_index(),
            Some(_) => index_arg(args, "index")?,
        };

        let uri = self
            .queue
            .track_at(index)
            .ok_or_else(|| Error::InvalidIndex(format!("Invalid index: {}", index)))?
            .to_string();

        let info = self.track_info(uri).await;
        serde_json::to_value(info).map_err(|e| Error::Internal(e.to_string()))
    }

    // ── Playlists ───────────────────────────────────────────────────────

    async fn cmd_save(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let name =
            opt_str_arg(args, "name").ok_or_else(|| Error::InvalidArgs("Name required".to_string()))?;
        let format = opt_str_arg(args, "format").unwrap_or_else(|| "json".to_string());

        let data_dir = self.data_dir.clone();
        let tracks = self.queue.tracks().to_vec();
        let count = tracks.len();
        let path = tokio::task::spawn_blocking(move || {
            playlist::save(&data_dir, &name, &format, &tracks)
        })
        .await
        .map_err(|e| Error::Internal(format!("playlist save task: {}", e)))??;

        Ok(json!({"saved": path.display().to_string(), "track_count": count}))
    }

    async fn cmd_load(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let name =
            opt_str_arg(args, "name").ok_or_else(|| Error::InvalidArgs("Name required".to_string()))?;

        let data_dir = self.data_dir.clone();
        let (path, tracks) =
            tokio::task::spawn_blocking(move || playlist::load(&data_dir, &name))
                .await
                .map_err(|e| Error::Internal(format!("playlist load task: {}", e)))??;

        self.clear_internal().await;
        for uri in tracks {
            if is_supported_format(&uri) {
                self.queue.add(uri);
            } else {
                warn!("Skipping unsupported track: {}", uri);
            }
        }
        self.emit_queue_updated();

        Ok(json!({
            "loaded": path.display().to_string(),
            "track_count": self.queue.len(),
        }))
    }

    async fn cmd_playlists(&mut self) -> Result<Value> {
        let data_dir = self.data_dir.clone();
        let playlists = tokio::task::spawn_blocking(move || playlist::list(&data_dir))
            .await
            .map_err(|e| Error::Internal(format!("playlist list task: {}", e)))??;
        Ok(json!({"playlists": playlists}))
    }

    // ── Audio devices ───────────────────────────────────────────────────

    async fn cmd_devices(&mut self) -> Result<Value> {
        let devices = tokio::task::spawn_blocking(output::list_devices)
            .await
            .map_err(|e| Error::Internal(format!("device enumeration task: {}", e)))??;
        Ok(json!({"devices": devices}))
    }

    async fn cmd_set_device(&mut self, args: &Map<String, Value>) -> Result<Value> {
        let device_id = args.get("device_id").cloned().unwrap_or(Value::Null);

        let name = match &device_id {
            Value::String(id) if !id.is_empty() => Some(output::device_name_from_id(id)?),
            _ => None,
        };

        self.engine.set_device(name).await;
        Ok(json!({"device_id": device_id}))
    }

    // ── Track-end and ticker ────────────────────────────────────────────

    /// Natural track-end: replay under repeat=track, otherwise advance, and
    /// finish the queue when there is nowhere left to go.
    pub async fn handle_track_end(&mut self) {
        debug!("Track ended");
        if self.queue.repeat() == RepeatMode::Track {
            self.play_current().await;
            return;
        }

        if self.queue.advance() {
            self.play_current().await;
        } else {
            self.engine.stop().await;
            self.state = PlaybackState::Stopped;
            self.position = 0.0;
            self.emit(EventType::QueueFinished, json!({}));
        }
    }

    /// 1 Hz position tick; lossy by design.
    pub fn tick(&mut self) {
        if self.state != PlaybackState::Playing || !self.outbound.has_subscribers() {
            return;
        }
        self.position = self.engine.position();
        let duration = self.engine.duration().unwrap_or(0.0);
        self.emit(
            EventType::PositionUpdate,
            json!({"position": self.position, "duration": duration}),
        );
    }

    /// Load and play the current queue entry. On failure, emit an `error`
    /// event and advance past the offending track; a queue of only-failing
    /// tracks terminates stopped with a single `queue_finished`.
    async fn play_current(&mut self) {
        let mut attempts = 0usize;
        loop {
            let Some(uri) = self.queue.current_track().map(str::to_string) else {
                return;
            };

            match self.load_and_play(&uri).await {
                Ok(()) => {
                    self.state = PlaybackState::Playing;
                    self.position = 0.0;
                    let info = TrackInfo::from_path(&uri, self.engine.duration());
                    self.emit(
                        EventType::TrackChanged,
                        json!({"track": info, "queue_position": self.queue.current_index()}),
                    );
                    self.emit(EventType::PlaybackStarted, json!({"track": info}));
                    return;
                }
                Err(e) => {
                    warn!("Failed to play {}: {}", uri, e);
                    self.emit(
                        EventType::Error,
                        json!({"code": e.code(), "message": e.to_string(), "track": uri}),
                    );

                    attempts += 1;
                    if attempts >= self.queue.len() || !self.queue.advance() {
                        self.engine.stop().await;
                        self.state = PlaybackState::Stopped;
                        self.position = 0.0;
                        self.emit(EventType::QueueFinished, json!({}));
                        return;
                    }
                }
            }
        }
    }

    async fn load_and_play(&self, uri: &str) -> Result<()> {
        self.engine.load(uri).await?;
        self.engine.play(0.0).await
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    fn emit(&self, event: EventType, data: Value) {
        self.outbound.send_event(event, data);
    }

    fn emit_queue_updated(&self) {
        // Cheap track infos here; durations are probed only on demand by
        // the queue/info commands.
        let tracks: Vec<TrackInfo> = self
            .queue
            .tracks()
            .iter()
            .map(|uri| TrackInfo::from_path(uri, None))
            .collect();
        self.emit(
            EventType::QueueUpdated,
            json!({"queue": {"tracks": tracks, "current_index": self.queue.current_index()}}),
        );
    }

    /// Track info with duration: from the engine when this track is loaded,
    /// otherwise probed from the file header on a blocking worker.
    async fn track_info(&self, uri: String) -> TrackInfo {
        if self.engine.current_uri().as_deref() == Some(uri.as_str()) {
            return TrackInfo::from_path(&uri, self.engine.duration());
        }
        let probe_uri = uri.clone();
        let duration = tokio::task::spawn_blocking(move || decoder::probe_duration(&probe_uri))
            .await
            .unwrap_or(None);
        TrackInfo::from_path(&uri, duration)
    }

    async fn probed_track_infos(&self, uris: Vec<String>) -> Vec<TrackInfo> {
        let loaded = self.engine.current_uri();
        let loaded_duration = self.engine.duration();
        tokio::task::spawn_blocking(move || {
            uris.into_iter()
                .map(|uri| {
                    if loaded.as_deref() == Some(uri.as_str()) {
                        TrackInfo::from_path(&uri, loaded_duration)
                    } else {
                        let duration = decoder::probe_duration(&uri);
                        TrackInfo::from_path(&uri, duration)
                    }
                })
                .collect()
        })
        .await
        .unwrap_or_default()
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Snapshot the persisted subset of session state.
    pub fn snapshot(&self) -> SessionState {
        SessionState {
            queue: self.queue.tracks().to_vec(),
            current_index: self.queue.current_index(),
            shuffle: self.queue.shuffle_enabled(),
            shuffle_order: self.queue.shuffle_order().to_vec(),
            repeat: self.queue.repeat(),
            volume: self.engine.volume(),
            rate: self.engine.rate(),
        }
    }

    /// Restore a snapshot: rebuild the queue and re-apply volume and rate.
    /// Playback stays stopped; position is never restored.
    pub fn restore(&mut self, state: SessionState) {
        self.queue = Queue::from_parts(
            state.queue,
            state.current_index,
            state.shuffle,
            state.shuffle_order,
            state.repeat,
        );
        self.engine.set_volume(state.volume as i64);
        self.engine.set_rate(state.rate as f64, None);
    }

    /// Write the snapshot to `${data}/session.json`.
    pub fn save_state(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join(STATE_FILE);
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| Error::Internal(format!("serialize session state: {}", e)))?;
        std::fs::write(&path, json)?;
        debug!("Saved session state to {}", path.display());
        Ok(())
    }

    /// Best-effort restore from `${data}/session.json` at startup.
    pub fn load_state(&mut self) {
        let path = self.data_dir.join(STATE_FILE);
        if !path.exists() {
            return;
        }
        match std::fs::read_to_string(&path)
            .map_err(Error::from)
            .and_then(|contents| {
                serde_json::from_str::<SessionState>(&contents)
                    .map_err(|e| Error::Internal(format!("bad session state: {}", e)))
            }) {
            Ok(state) => {
                info!("Restored session state from {}", path.display());
                self.restore(state);
            }
            Err(e) => warn!("Ignoring saved session state: {}", e),
        }
    }
}

fn opt_str_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Queue index argument: missing or non-numeric is InvalidArgs, negative is
/// InvalidIndex (range errors against the queue come later).
fn index_arg(args: &Map<String, Value>, key: &str) -> Result<usize> {
    let value = args
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::InvalidArgs(format!("{} required", capitalise(key))))?;
    if value < 0 {
        return Err(Error::InvalidIndex(format!("Invalid queue index: {}", value)));
    }
    Ok(value as usize)
}

fn capitalise(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
