//! Audio decoding using symphonia
//!
//! Decodes a whole file (MP3, FLAC, AAC, Vorbis, Opus, WAV, ...) to
//! interleaved stereo f32, then resamples to the canonical 44.1 kHz rate.
//! Opus goes through the libopus adapter registered alongside the stock
//! codecs.

use atk_common::error::{Error, Result};
use crate::audio::{buffer::TrackBuffer, is_supported_format, resampler, SAMPLE_RATE};
use std::path::Path;
use std::sync::OnceLock;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{CodecRegistry, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia_adapter_libopus::OpusDecoder;
use tracing::{debug, warn};

/// Codec registry with Opus support added to the stock decoders.
fn codec_registry() -> &'static CodecRegistry {
    static REGISTRY: OnceLock<CodecRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        registry.register_all::<OpusDecoder>();
        registry.register_all::<symphonia::default::codecs::MpaDecoder>();
        registry.register_all::<symphonia::default::codecs::PcmDecoder>();
        registry.register_all::<symphonia::default::codecs::VorbisDecoder>();
        registry.register_all::<symphonia::default::codecs::FlacDecoder>();
        registry.register_all::<symphonia::default::codecs::AdpcmDecoder>();
        registry.register_all::<symphonia::default::codecs::AacDecoder>();
        registry
    })
}

/// Load a track: validate the extension, decode the whole file, and resample
/// to canonical stereo 44.1 kHz.
pub fn load_track(uri: &str) -> Result<TrackBuffer> {
    if !is_supported_format(uri) {
        return Err(Error::UnsupportedFormat(uri.to_string()));
    }

    let path = Path::new(uri);
    if !path.exists() {
        return Err(Error::FileNotFound(uri.to_string()));
    }

    let (samples, source_rate) = decode_file(path)?;
    let samples = resampler::resample_to_canonical(&samples, source_rate, 2)?;

    debug!(
        "Loaded {}: {} frames at {}Hz",
        uri,
        samples.len() / 2,
        SAMPLE_RATE
    );
    Ok(TrackBuffer::new(samples))
}

/// Probe a file header for its duration in seconds, without decoding.
///
/// Returns None when the container does not carry a frame count (common for
/// unindexed MP3 streams).
pub fn probe_duration(uri: &str) -> Option<f64> {
    let path = Path::new(uri);
    if !path.exists() {
        return None;
    }

    let file = std::fs::File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)?;

    let n_frames = track.codec_params.n_frames?;
    let sample_rate = track.codec_params.sample_rate?;
    Some(n_frames as f64 / sample_rate as f64)
}

/// Decode an entire audio file to interleaved stereo f32 samples.
///
/// Returns the samples and the source sample rate (before resampling).
fn decode_file(path: &Path) -> Result<(Vec<f32>, u32)> {
    debug!("Decoding file: {}", path.display());

    let file = std::fs::File::open(path)
        .map_err(|e| Error::Decode(format!("Failed to open {}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

    let mut decoder = codec_registry()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => convert_to_stereo_f32(&decoded, &mut samples),
            Err(e) => {
                warn!("Decode error: {}", e);
                continue;
            }
        }
    }

    if samples.is_empty() {
        return Err(Error::Decode(format!(
            "No samples decoded from {}",
            path.display()
        )));
    }

    debug!("Decoded {} frames", samples.len() / 2);
    Ok((samples, sample_rate))
}

/// Convert a decoded packet to interleaved stereo f32 and append to `output`.
///
/// Every symphonia sample format is normalised to [-1.0, 1.0]; mono sources
/// are duplicated to both channels, wider layouts keep their first two.
fn convert_to_stereo_f32(decoded: &AudioBufferRef, output: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::F32(buf) => interleave_stereo(buf.as_ref(), output, |s| s),
        AudioBufferRef::F64(buf) => interleave_stereo(buf.as_ref(), output, |s| s as f32),
        AudioBufferRef::S32(buf) => {
            interleave_stereo(buf.as_ref(), output, |s| s as f32 / i32::MAX as f32)
        }
        AudioBufferRef::S16(buf) => {
            interleave_stereo(buf.as_ref(), output, |s| s as f32 / i16::MAX as f32)
        }
        AudioBufferRef::S8(buf) => {
            interleave_stereo(buf.as_ref(), output, |s| s as f32 / i8::MAX as f32)
        }
        AudioBufferRef::U32(buf) => {
            interleave_stereo(buf.as_ref(), output, |s| (s as i32) as f32 / i32::MAX as f32)
        }
        AudioBufferRef::U16(buf) => {
            interleave_stereo(buf.as_ref(), output, |s| ((s as i32) - 32768) as f32 / 32768.0)
        }
        AudioBufferRef::U8(buf) => {
            interleave_stereo(buf.as_ref(), output, |s| ((s as i32) - 128) as f32 / 128.0)
        }
        AudioBufferRef::S24(buf) => {
            interleave_stereo(buf.as_ref(), output, |s| s.inner() as f32 / 8388608.0)
        }
        AudioBufferRef::U24(buf) => interleave_stereo(buf.as_ref(), output, |s| {
            ((s.inner() as i32) - 8388608) as f32 / 8388608.0
        }),
    }
}

/// Interleave a planar buffer to stereo, converting each sample with `to_f32`.
fn interleave_stereo<T, F>(buf: &AudioBuffer<T>, output: &mut Vec<f32>, to_f32: F)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let num_channels = buf.spec().channels.count();
    let num_frames = buf.frames();

    output.reserve(num_frames * 2);
    match num_channels {
        0 => {}
        1 => {
            // Duplicate mono to both channels
            for frame_idx in 0..num_frames {
                let sample = to_f32(buf.chan(0)[frame_idx]);
                output.push(sample);
                output.push(sample);
            }
        }
        _ => {
            // Keep the first two channels of wider layouts
            for frame_idx in 0..num_frames {
                output.push(to_f32(buf.chan(0)[frame_idx]));
                output.push(to_f32(buf.chan(1)[frame_idx]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_rejects_unsupported_extension() {
        let err = load_track("/tmp/notes.txt").unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_track("/nonexistent/track.mp3").unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_probe_duration_missing_file() {
        assert!(probe_duration("/nonexistent/track.flac").is_none());
    }

    // Decoding of real audio content is covered by the integration tests,
    // which synthesize WAV fixtures.
}
