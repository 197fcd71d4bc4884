//! Playback engine
//!
//! Owns the decoded track buffer and the output device, and exposes the
//! thread-safe transport operations (load/play/pause/seek/...). One mutex
//! guards the cursor, the playing/active flags, and the buffer reference;
//! volume, rate, and rate mode are plain atomics readable from the audio
//! callback without taking the lock.
//!
//! The cpal stream is not Send/Sync, so it lives on a dedicated audio-host
//! thread; the engine drives that thread over a channel. Track-end is
//! reported from the realtime callback through an unbounded notice channel,
//! never by calling back into the engine.

use atk_common::error::{Error, Result};
use atk_common::types::RateMode;
use crate::audio::dsp::{self, RenderScratch};
use crate::audio::output::AudioOutput;
use crate::audio::{decoder, is_supported_format, TrackBuffer, CHANNELS, SAMPLE_RATE};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Notices posted from the audio callback to the control task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineNotice {
    /// The callback reached end-of-buffer while not paused.
    TrackEnded,
}

/// State guarded by the engine mutex.
struct EngineState {
    buffer: Option<Arc<TrackBuffer>>,
    /// Read position in frames
    cursor: usize,
    /// A render task should run (false once the track has ended or stopped)
    active: bool,
    /// Produce sound rather than silence
    playing: bool,
    current_uri: Option<String>,
}

/// State shared between the engine handle and the audio callback.
struct EngineShared {
    state: Mutex<EngineState>,
    /// Volume 0..=100
    volume: AtomicU8,
    /// Playback rate as f32 bits
    rate_bits: AtomicU32,
    /// 0 = stretch, 1 = tape
    rate_mode: AtomicU8,
    notices: mpsc::UnboundedSender<EngineNotice>,
}

impl EngineShared {
    fn rate(&self) -> f32 {
        f32::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    fn mode(&self) -> RateMode {
        match self.rate_mode.load(Ordering::Relaxed) {
            1 => RateMode::Tape,
            _ => RateMode::Stretch,
        }
    }
}

/// Commands to the audio-host thread that owns the cpal stream.
enum HostCommand {
    Start {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SetDevice {
        name: Option<String>,
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Thread-safe playback engine handle.
pub struct Engine {
    shared: Arc<EngineShared>,
    host: std::sync::mpsc::Sender<HostCommand>,
}

impl Engine {
    /// Create the engine and its audio-host thread. The returned receiver
    /// yields end-of-track notices for the control task.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<EngineNotice>) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(EngineShared {
            state: Mutex::new(EngineState {
                buffer: None,
                cursor: 0,
                active: false,
                playing: false,
                current_uri: None,
            }),
            volume: AtomicU8::new(100),
            rate_bits: AtomicU32::new(1.0f32.to_bits()),
            rate_mode: AtomicU8::new(0),
            notices: notice_tx,
        });

        let (host_tx, host_rx) = std::sync::mpsc::channel();
        {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("atk-audio-host".to_string())
                .spawn(move || audio_host(shared, host_rx))
                .expect("failed to spawn audio host thread");
        }

        (
            Arc::new(Self {
                shared,
                host: host_tx,
            }),
            notice_rx,
        )
    }

    /// Load and decode a track, replacing any current buffer.
    ///
    /// The device is stopped first so no callback can pull from a
    /// half-initialised buffer. Decoding runs on a blocking worker.
    pub async fn load(&self, uri: &str) -> Result<()> {
        if !is_supported_format(uri) {
            return Err(Error::UnsupportedFormat(uri.to_string()));
        }

        let path = PathBuf::from(uri);
        if !path.exists() {
            return Err(Error::FileNotFound(uri.to_string()));
        }

        self.host_stop().await;

        let owned_uri = uri.to_string();
        let buffer = tokio::task::spawn_blocking(move || decoder::load_track(&owned_uri))
            .await
            .map_err(|e| Error::Internal(format!("decode task failed: {}", e)))??;

        let mut state = self.lock_state();
        state.buffer = Some(Arc::new(buffer));
        state.cursor = 0;
        state.active = false;
        state.playing = false;
        state.current_uri = Some(uri.to_string());
        Ok(())
    }

    /// Start playback from `start_seconds`. No-op when nothing is loaded.
    pub async fn play(&self, start_seconds: f64) -> Result<()> {
        {
            let mut state = self.lock_state();
            let Some(buffer) = state.buffer.clone() else {
                return Ok(());
            };
            state.cursor = buffer.frame_for_seconds(start_seconds);
            state.playing = true;
            state.active = true;
        }
        self.host_start().await
    }

    /// Pause: keep the device running, emit silence.
    pub fn pause(&self) {
        self.lock_state().playing = false;
    }

    /// Resume playback; restarts the device if it was closed.
    pub async fn unpause(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            if state.buffer.is_none() {
                return Ok(());
            }
            state.playing = true;
            state.active = true;
        }
        self.host_start().await
    }

    /// Stop playback, close the device, reset the cursor.
    pub async fn stop(&self) {
        {
            let mut state = self.lock_state();
            state.playing = false;
            state.active = false;
            state.cursor = 0;
        }
        self.host_stop().await;
    }

    /// Reposition the cursor. No-op when nothing is loaded.
    pub fn seek(&self, seconds: f64) {
        let mut state = self.lock_state();
        if let Some(buffer) = state.buffer.clone() {
            state.cursor = buffer.frame_for_seconds(seconds);
        }
    }

    /// Set the volume, clamped to [0, 100]. Returns the effective value.
    pub fn set_volume(&self, level: i64) -> u8 {
        let clamped = level.clamp(0, 100) as u8;
        self.shared.volume.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn volume(&self) -> u8 {
        self.shared.volume.load(Ordering::Relaxed)
    }

    /// Set the playback rate, clamped to [0.25, 4.0], and optionally the
    /// rate mode. Returns the effective rate.
    pub fn set_rate(&self, speed: f64, mode: Option<RateMode>) -> f32 {
        let clamped = (speed as f32).clamp(0.25, 4.0);
        self.shared
            .rate_bits
            .store(clamped.to_bits(), Ordering::Relaxed);
        if let Some(mode) = mode {
            let bit = match mode {
                RateMode::Stretch => 0,
                RateMode::Tape => 1,
            };
            self.shared.rate_mode.store(bit, Ordering::Relaxed);
        }
        clamped
    }

    pub fn rate(&self) -> f32 {
        self.shared.rate()
    }

    pub fn rate_mode(&self) -> RateMode {
        self.shared.mode()
    }

    /// Current position in source-time seconds, regardless of rate.
    pub fn position(&self) -> f64 {
        self.lock_state().cursor as f64 / SAMPLE_RATE as f64
    }

    /// Duration of the loaded track, if any.
    pub fn duration(&self) -> Option<f64> {
        self.lock_state()
            .buffer
            .as_ref()
            .map(|b| b.duration_seconds())
    }

    pub fn current_uri(&self) -> Option<String> {
        self.lock_state().current_uri.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.lock_state().buffer.is_some()
    }

    /// Select the output device for subsequent starts (None = default).
    pub async fn set_device(&self, name: Option<String>) {
        let (reply, rx) = oneshot::channel();
        if self
            .host
            .send(HostCommand::SetDevice { name, reply })
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Shut the audio-host thread down, closing any open stream.
    pub fn shutdown(&self) {
        let _ = self.host.send(HostCommand::Shutdown);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn host_start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.host
            .send(HostCommand::Start { reply })
            .map_err(|_| Error::Internal("audio host thread gone".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("audio host thread gone".to_string()))?
    }

    async fn host_stop(&self) {
        let (reply, rx) = oneshot::channel();
        if self.host.send(HostCommand::Stop { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Audio-host thread body: owns the cpal output for its whole lifetime.
fn audio_host(shared: Arc<EngineShared>, rx: std::sync::mpsc::Receiver<HostCommand>) {
    let mut output: Option<AudioOutput> = None;
    let mut device_name: Option<String> = None;

    while let Ok(command) = rx.recv() {
        match command {
            HostCommand::Start { reply } => {
                let result = if output.is_some() {
                    Ok(())
                } else {
                    match start_output(&shared, device_name.as_deref()) {
                        Ok(started) => {
                            output = Some(started);
                            Ok(())
                        }
                        Err(e) => {
                            error!("Failed to start audio output: {}", e);
                            Err(e)
                        }
                    }
                };
                let _ = reply.send(result);
            }
            HostCommand::Stop { reply } => {
                if let Some(mut out) = output.take() {
                    out.stop();
                }
                let _ = reply.send(());
            }
            HostCommand::SetDevice { name, reply } => {
                debug!("Audio device set to {:?}", name);
                device_name = name;
                let _ = reply.send(());
            }
            HostCommand::Shutdown => {
                if let Some(mut out) = output.take() {
                    out.stop();
                }
                break;
            }
        }
    }
    info!("Audio host thread exiting");
}

fn start_output(shared: &Arc<EngineShared>, device_name: Option<&str>) -> Result<AudioOutput> {
    let mut output = AudioOutput::new(device_name)?;
    let shared = Arc::clone(shared);
    let mut scratch = RenderScratch::new();
    output.start(move |out| render(&shared, &mut scratch, out))?;
    Ok(output)
}

/// Render one callback's worth of audio.
///
/// Locks briefly to read flags and slice out the source chunk, releases the
/// lock for the DSP work, then locks again to advance the cursor.
fn render(shared: &EngineShared, scratch: &mut RenderScratch, out: &mut [f32]) {
    let out_frames = out.len() / CHANNELS;
    let rate = shared.rate();
    let mode = shared.mode();
    let gain = shared.volume.load(Ordering::Relaxed) as f32 / 100.0;

    let frames_read = {
        let mut state = match shared.state.lock() {
            Ok(state) => state,
            Err(_) => {
                dsp::silence(out);
                return;
            }
        };

        if !state.active || !state.playing {
            dsp::silence(out);
            return;
        }

        let Some(buffer) = state.buffer.clone() else {
            dsp::silence(out);
            return;
        };

        let want = dsp::source_frames_for(rate, out_frames);
        let read = buffer.read_frames(state.cursor, want, &mut scratch.source);

        if read == 0 {
            // End of track: go quiet and tell the control task exactly once.
            state.active = false;
            state.playing = false;
            drop(state);
            dsp::silence(out);
            if shared.notices.send(EngineNotice::TrackEnded).is_err() {
                warn!("Engine notice channel closed");
            }
            return;
        }
        read
    };

    // DSP on the local chunk, lock released
    if rate == 1.0 {
        dsp::write_frames(&scratch.source, out);
    } else {
        match mode {
            RateMode::Tape => {
                let RenderScratch {
                    source, converted, ..
                } = scratch;
                dsp::tape_resample(source, converted, out_frames);
                dsp::write_frames(converted, out);
            }
            RateMode::Stretch => {
                let mut converted = std::mem::take(&mut scratch.converted);
                let source = std::mem::take(&mut scratch.source);
                dsp::time_stretch(&source, &mut converted, out_frames, scratch);
                dsp::write_frames(&converted, out);
                scratch.converted = converted;
                scratch.source = source;
            }
        }
    }
    dsp::apply_gain_and_clip(out, gain);

    // Advance the cursor by the source frames consumed (both rate modes), so
    // position always moves in source-time seconds.
    if let Ok(mut state) = shared.state.lock() {
        let total = state
            .buffer
            .as_ref()
            .map(|b| b.total_frames())
            .unwrap_or(0);
        state.cursor = (state.cursor + frames_read).min(total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_volume_clamping() {
        let (engine, _notices) = Engine::new();
        assert_eq!(engine.set_volume(150), 100);
        assert_eq!(engine.set_volume(-5), 0);
        assert_eq!(engine.set_volume(80), 80);
        assert_eq!(engine.volume(), 80);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_rate_clamping_and_mode() {
        let (engine, _notices) = Engine::new();
        assert_eq!(engine.set_rate(9.0, None), 4.0);
        assert_eq!(engine.set_rate(0.01, None), 0.25);
        assert_eq!(engine.set_rate(1.5, Some(RateMode::Tape)), 1.5);
        assert_eq!(engine.rate_mode(), RateMode::Tape);
        // Omitting the mode keeps the previous one
        engine.set_rate(2.0, None);
        assert_eq!(engine.rate_mode(), RateMode::Tape);
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_load_rejects_bad_paths() {
        let (engine, _notices) = Engine::new();
        assert!(matches!(
            engine.load("/tmp/file.xyz").await.unwrap_err(),
            Error::UnsupportedFormat(_)
        ));
        assert!(matches!(
            engine.load("/nonexistent/a.mp3").await.unwrap_err(),
            Error::FileNotFound(_)
        ));
        assert!(!engine.is_loaded());
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_play_without_buffer_is_noop() {
        let (engine, _notices) = Engine::new();
        engine.play(0.0).await.unwrap();
        assert_eq!(engine.position(), 0.0);
        assert!(engine.duration().is_none());
        engine.shutdown();
    }

    #[test]
    fn test_render_silence_when_inactive() {
        let (notice_tx, _notice_rx) = mpsc::unbounded_channel();
        let shared = EngineShared {
            state: Mutex::new(EngineState {
                buffer: Some(Arc::new(TrackBuffer::new(vec![0.5; 256]))),
                cursor: 0,
                active: false,
                playing: false,
                current_uri: None,
            }),
            volume: AtomicU8::new(100),
            rate_bits: AtomicU32::new(1.0f32.to_bits()),
            rate_mode: AtomicU8::new(0),
            notices: notice_tx,
        };

        let mut scratch = RenderScratch::new();
        let mut out = vec![9.0; 64];
        render(&shared, &mut scratch, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_render_plays_and_signals_end() {
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let shared = EngineShared {
            state: Mutex::new(EngineState {
                buffer: Some(Arc::new(TrackBuffer::new(vec![0.5; 64]))), // 32 frames
                cursor: 0,
                active: true,
                playing: true,
                current_uri: None,
            }),
            volume: AtomicU8::new(50),
            rate_bits: AtomicU32::new(1.0f32.to_bits()),
            rate_mode: AtomicU8::new(0),
            notices: notice_tx,
        };

        let mut scratch = RenderScratch::new();

        // First callback: 16 frames of data at half volume
        let mut out = vec![0.0; 32];
        render(&shared, &mut scratch, &mut out);
        assert!((out[0] - 0.25).abs() < 1e-6);
        assert_eq!(shared.state.lock().unwrap().cursor, 16);

        // Second callback: remaining 16 frames
        render(&shared, &mut scratch, &mut out);
        assert_eq!(shared.state.lock().unwrap().cursor, 32);

        // Third callback: end of track
        render(&shared, &mut scratch, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(notice_rx.try_recv().unwrap(), EngineNotice::TrackEnded);
        let state = shared.state.lock().unwrap();
        assert!(!state.active);
        assert!(!state.playing);
    }

    #[test]
    fn test_render_tape_rate_advances_by_source_frames() {
        let (notice_tx, _notice_rx) = mpsc::unbounded_channel();
        let shared = EngineShared {
            state: Mutex::new(EngineState {
                buffer: Some(Arc::new(TrackBuffer::new(vec![0.5; 4096]))), // 2048 frames
                cursor: 0,
                active: true,
                playing: true,
                current_uri: None,
            }),
            volume: AtomicU8::new(100),
            rate_bits: AtomicU32::new(2.0f32.to_bits()),
            rate_mode: AtomicU8::new(1), // tape
            notices: notice_tx,
        };

        let mut scratch = RenderScratch::new();
        let mut out = vec![0.0; 512]; // 256 output frames
        render(&shared, &mut scratch, &mut out);

        // At rate 2.0 the cursor moves twice as fast as the output
        assert_eq!(shared.state.lock().unwrap().cursor, 512);
        assert!((out[0] - 0.5).abs() < 1e-6);
    }
}
