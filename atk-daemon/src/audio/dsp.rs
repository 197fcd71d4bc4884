//! Per-callback DSP chain
//!
//! Each device callback asks for a fixed number of output frames. The chain
//! reads `round(n_out × rate)` source frames, rate-converts them to exactly
//! `n_out` frames (tape-style linear interpolation, or Hann-window
//! overlap-add when preserving pitch), scales by volume, clips, and emits
//! exactly `n_out × 2` interleaved samples.
//!
//! All working vectors live in [`RenderScratch`] and are reused across
//! callbacks, so the hot path stops allocating once the first buffer has
//! been rendered.

use crate::audio::CHANNELS;

/// Window length cap for the overlap-add stretch
const STRETCH_WINDOW: usize = 1024;

/// Window-sum threshold below which output frames are left at zero
const NORM_EPSILON: f32 = 1e-8;

/// Reusable working buffers for the render path.
#[derive(Debug, Default)]
pub struct RenderScratch {
    /// Source chunk sliced out of the track buffer
    pub source: Vec<f32>,
    /// Rate-converted output
    pub converted: Vec<f32>,
    /// Cached Hann window (regenerated when the length changes)
    window: Vec<f32>,
    /// Accumulated window weight per output frame
    window_sum: Vec<f32>,
}

impl RenderScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regenerate the cached Hann window when the length changes.
    fn ensure_window(&mut self, len: usize) {
        if self.window.len() != len {
            self.window.clear();
            self.window.resize(len, 0.0);
            if len > 1 {
                let denom = (len - 1) as f32;
                for (i, w) in self.window.iter_mut().enumerate() {
                    *w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos());
                }
            }
        }
    }
}

/// Number of source frames to read for `out_frames` of output at `rate`.
pub fn source_frames_for(rate: f32, out_frames: usize) -> usize {
    if rate == 1.0 {
        out_frames
    } else {
        ((out_frames as f32 * rate).round() as usize).max(1)
    }
}

/// Tape-style rate conversion: per-channel linear interpolation of the
/// source chunk to exactly `out_frames` frames. Pitch follows speed.
pub fn tape_resample(source: &[f32], out: &mut Vec<f32>, out_frames: usize) {
    out.clear();
    let src_frames = source.len() / CHANNELS;
    if src_frames == 0 || out_frames == 0 {
        return;
    }

    out.resize(out_frames * CHANNELS, 0.0);
    let last = (src_frames - 1) as f64;

    for i in 0..out_frames {
        let pos = if out_frames > 1 {
            i as f64 * last / (out_frames - 1) as f64
        } else {
            0.0
        };
        let i0 = pos.floor() as usize;
        let i1 = (i0 + 1).min(src_frames - 1);
        let frac = (pos - i0 as f64) as f32;

        for ch in 0..CHANNELS {
            let a = source[i0 * CHANNELS + ch];
            let b = source[i1 * CHANNELS + ch];
            out[i * CHANNELS + ch] = a + (b - a) * frac;
        }
    }
}

/// Pitch-preserving time stretch: overlap-add with a Hann window of
/// min(1024, source_frames) and an input hop of window/2. Windowed source
/// segments accumulate into a sum buffer alongside a window-sum buffer;
/// frames with enough window weight are normalised, then the result is
/// truncated or zero-padded to exactly `out_frames`.
pub fn time_stretch(
    source: &[f32],
    out: &mut Vec<f32>,
    out_frames: usize,
    scratch: &mut RenderScratch,
) {
    out.clear();
    let src_frames = source.len() / CHANNELS;
    if src_frames == 0 || out_frames == 0 {
        return;
    }

    let win_len = src_frames.min(STRETCH_WINDOW);
    let hop_in = win_len / 2;
    if hop_in == 0 {
        // Chunk too small to window; pass it through at the output size.
        out.extend_from_slice(source);
        out.resize(out_frames * CHANNELS, 0.0);
        out.truncate(out_frames * CHANNELS);
        return;
    }

    let hop_out = (hop_in * src_frames / out_frames).max(1);
    let n_windows = ((src_frames - win_len) / hop_in + 1).max(1);
    let out_len = (n_windows - 1) * hop_out + win_len;

    out.resize(out_len * CHANNELS, 0.0);
    scratch.ensure_window(win_len);
    let RenderScratch {
        window, window_sum, ..
    } = scratch;
    window_sum.clear();
    window_sum.resize(out_len, 0.0);

    for w in 0..n_windows {
        let in_start = w * hop_in;
        let out_start = w * hop_out;
        if in_start + win_len > src_frames || out_start + win_len > out_len {
            break;
        }
        for j in 0..win_len {
            let weight = window[j];
            for ch in 0..CHANNELS {
                out[(out_start + j) * CHANNELS + ch] +=
                    source[(in_start + j) * CHANNELS + ch] * weight;
            }
            window_sum[out_start + j] += weight;
        }
    }

    for j in 0..out_len {
        let weight = window_sum[j];
        if weight > NORM_EPSILON {
            for ch in 0..CHANNELS {
                out[j * CHANNELS + ch] /= weight;
            }
        }
    }

    // Exact output framing
    out.resize(out_frames * CHANNELS, 0.0);
    out.truncate(out_frames * CHANNELS);
}

/// Copy `processed` into the device buffer, zero-padding short input and
/// truncating long input to the buffer length.
pub fn write_frames(processed: &[f32], out: &mut [f32]) {
    let n = processed.len().min(out.len());
    out[..n].copy_from_slice(&processed[..n]);
    out[n..].fill(0.0);
}

/// Scale every sample by `gain` and clamp to [-1, 1].
pub fn apply_gain_and_clip(samples: &mut [f32], gain: f32) {
    for sample in samples.iter_mut() {
        *sample = (*sample * gain).clamp(-1.0, 1.0);
    }
}

/// Fill the device buffer with silence.
pub fn silence(out: &mut [f32]) {
    out.fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_const(frames: usize, value: f32) -> Vec<f32> {
        vec![value; frames * CHANNELS]
    }

    #[test]
    fn test_source_sizing() {
        assert_eq!(source_frames_for(1.0, 512), 512);
        assert_eq!(source_frames_for(2.0, 512), 1024);
        assert_eq!(source_frames_for(0.5, 512), 256);
        assert_eq!(source_frames_for(1.5, 100), 150);
        // Never asks for zero source frames
        assert_eq!(source_frames_for(0.25, 1), 1);
    }

    #[test]
    fn test_tape_resample_exact_output_size() {
        let source = stereo_const(1024, 0.5);
        let mut out = Vec::new();
        tape_resample(&source, &mut out, 512);
        assert_eq!(out.len(), 512 * CHANNELS);

        tape_resample(&source, &mut out, 2048);
        assert_eq!(out.len(), 2048 * CHANNELS);
    }

    #[test]
    fn test_tape_resample_preserves_constant_signal() {
        let source = stereo_const(100, 0.25);
        let mut out = Vec::new();
        tape_resample(&source, &mut out, 50);
        for &s in &out {
            assert!((s - 0.25).abs() < 1e-6);
        }
    }

    #[test]
    fn test_tape_resample_interpolates_ramp() {
        // Two frames, left channel goes 0 -> 1; three output frames should
        // hit the midpoint.
        let source = vec![0.0, 0.0, 1.0, 1.0];
        let mut out = Vec::new();
        tape_resample(&source, &mut out, 3);
        assert_eq!(out.len(), 6);
        assert!((out[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_tape_resample_empty_source() {
        let mut out = vec![1.0; 8];
        tape_resample(&[], &mut out, 4);
        assert!(out.is_empty());
    }

    #[test]
    fn test_time_stretch_exact_output_size() {
        let mut scratch = RenderScratch::new();
        let source = stereo_const(2048, 0.5);
        let mut out = Vec::new();

        time_stretch(&source, &mut out, 512, &mut scratch);
        assert_eq!(out.len(), 512 * CHANNELS);

        time_stretch(&source, &mut out, 4096, &mut scratch);
        assert_eq!(out.len(), 4096 * CHANNELS);
    }

    #[test]
    fn test_time_stretch_normalises_constant_signal() {
        let mut scratch = RenderScratch::new();
        let source = stereo_const(2048, 0.5);
        let mut out = Vec::new();

        // Slow down by 2x: 1024 source frames' worth of windows spread out
        time_stretch(&source, &mut out, 1024, &mut scratch);

        // Interior frames where windows overlap should reconstruct the
        // constant level after window-sum normalisation.
        let mid = out.len() / 2;
        assert!(
            (out[mid] - 0.5).abs() < 0.05,
            "expected ~0.5, got {}",
            out[mid]
        );
    }

    #[test]
    fn test_time_stretch_tiny_chunk_passes_through() {
        let mut scratch = RenderScratch::new();
        let source = vec![0.3, 0.3]; // single frame
        let mut out = Vec::new();

        time_stretch(&source, &mut out, 4, &mut scratch);
        assert_eq!(out.len(), 4 * CHANNELS);
        assert_eq!(out[0], 0.3);
        assert_eq!(out[7], 0.0);
    }

    #[test]
    fn test_write_frames_pads_and_truncates() {
        let mut out = vec![9.0; 8];
        write_frames(&[1.0, 2.0], &mut out);
        assert_eq!(out, vec![1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let mut out = vec![0.0; 2];
        write_frames(&[1.0, 2.0, 3.0, 4.0], &mut out);
        assert_eq!(out, vec![1.0, 2.0]);
    }

    #[test]
    fn test_gain_and_clip() {
        let mut samples = vec![0.5, -0.5, 2.0, -2.0];
        apply_gain_and_clip(&mut samples, 0.5);
        assert_eq!(samples, vec![0.25, -0.25, 1.0, -1.0]);

        let mut samples = vec![0.8, -0.8];
        apply_gain_and_clip(&mut samples, 0.0);
        assert_eq!(samples, vec![0.0, 0.0]);
    }

    #[test]
    fn test_hann_window_shape() {
        let mut scratch = RenderScratch::new();
        scratch.ensure_window(8);
        let window = scratch.window.clone();
        assert_eq!(window.len(), 8);
        assert!(window[0].abs() < 1e-6);
        assert!(window[7].abs() < 1e-6);
        // Symmetric
        for i in 0..4 {
            assert!((window[i] - window[7 - i]).abs() < 1e-6);
        }
    }
}
