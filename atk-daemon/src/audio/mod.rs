//! Audio subsystem
//!
//! Decoding, resampling, the in-memory track buffer, the per-callback DSP
//! chain, and the cpal output device. Everything downstream of the decoder
//! works in interleaved stereo f32 at the canonical 44100 Hz.

pub mod buffer;
pub mod decoder;
pub mod dsp;
pub mod output;
pub mod resampler;

pub use buffer::TrackBuffer;

use std::path::Path;

/// Canonical output sample rate for all audio
pub const SAMPLE_RATE: u32 = 44100;

/// Canonical channel count (stereo)
pub const CHANNELS: usize = 2;

/// Recognised audio file extensions (lowercase, without dot)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "ogg", "flac", "wav", "opus", "m4a", "aac"];

/// Check whether a path carries a recognised audio extension.
pub fn is_supported_format(uri: &str) -> bool {
    Path::new(uri)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}
