//! Audio resampling using rubato
//!
//! Converts decoded audio to the canonical 44.1 kHz rate before it enters
//! the track buffer. This is decode-time conversion only; playback-rate
//! changes are handled per callback by the DSP chain.

use atk_common::error::{Error, Result};
use crate::audio::SAMPLE_RATE;
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

/// Resample interleaved audio to the canonical 44.1 kHz rate.
///
/// Returns the input unchanged when it is already at the target rate.
pub fn resample_to_canonical(input: &[f32], input_rate: u32, channels: u16) -> Result<Vec<f32>> {
    if input_rate == SAMPLE_RATE {
        return Ok(input.to_vec());
    }
    if input.is_empty() {
        return Ok(Vec::new());
    }

    debug!(
        "Resampling from {}Hz to {}Hz ({} channels)",
        input_rate, SAMPLE_RATE, channels
    );

    // rubato expects planar input
    let planar_input = deinterleave(input, channels);
    let input_frames = planar_input[0].len();

    let mut resampler = FastFixedIn::<f32>::new(
        SAMPLE_RATE as f64 / input_rate as f64,
        1.0,
        PolynomialDegree::Septic,
        input_frames,
        channels as usize,
    )
    .map_err(|e| Error::Decode(format!("Failed to create resampler: {}", e)))?;

    let planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| Error::Decode(format!("Resampling failed: {}", e)))?;

    Ok(interleave(planar_output))
}

/// Convert interleaved samples to planar format.
///
/// Input:  [L, R, L, R, ...]
/// Output: [[L, L, ...], [R, R, ...]]
fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let num_channels = channels as usize;
    let num_frames = samples.len() / num_channels;

    let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
    for frame_idx in 0..num_frames {
        for ch_idx in 0..num_channels {
            planar[ch_idx].push(samples[frame_idx * num_channels + ch_idx]);
        }
    }
    planar
}

/// Convert planar samples back to interleaved format.
fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    if planar.is_empty() {
        return Vec::new();
    }

    let num_channels = planar.len();
    let num_frames = planar[0].len();
    let mut interleaved = Vec::with_capacity(num_frames * num_channels);

    for frame_idx in 0..num_frames {
        for ch_idx in 0..num_channels {
            interleaved.push(planar[ch_idx][frame_idx]);
        }
    }
    interleaved
}
