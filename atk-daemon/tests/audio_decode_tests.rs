//! Decode pipeline tests against synthesized WAV fixtures
//!
//! These avoid the output device entirely: they cover decode, resample,
//! buffer geometry, and the engine's load/seek/position bookkeeping.

use atk_daemon::audio::decoder;
use atk_daemon::audio::SAMPLE_RATE;
use atk_daemon::engine::Engine;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a stereo 16-bit PCM WAV of `seconds` seconds at `sample_rate`.
fn write_wav(dir: &Path, name: &str, sample_rate: u32, seconds: f64) -> PathBuf {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let path = dir.join(name);
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let frames = (seconds * sample_rate as f64) as usize;
    for i in 0..frames {
        let t = i as f64 / sample_rate as f64;
        let sample = (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 0.5;
        let value = (sample * i16::MAX as f64) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
    path
}

#[test]
fn test_load_track_native_rate() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "tone.wav", SAMPLE_RATE, 0.5);

    let buffer = decoder::load_track(path.to_str().unwrap()).unwrap();
    let expected = (SAMPLE_RATE as f64 * 0.5) as usize;
    assert!(
        buffer.total_frames().abs_diff(expected) < 16,
        "expected ~{} frames, got {}",
        expected,
        buffer.total_frames()
    );
    assert!((buffer.duration_seconds() - 0.5).abs() < 0.01);
}

#[test]
fn test_load_track_resamples_to_canonical_rate() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "tone48k.wav", 48000, 0.5);

    let buffer = decoder::load_track(path.to_str().unwrap()).unwrap();
    // Half a second of audio is half a second at 44100 too
    let expected = (SAMPLE_RATE as f64 * 0.5) as usize;
    assert!(
        buffer.total_frames().abs_diff(expected) < 256,
        "expected ~{} frames, got {}",
        expected,
        buffer.total_frames()
    );
}

#[test]
fn test_decoded_samples_are_in_range() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "tone.wav", SAMPLE_RATE, 0.1);

    let buffer = decoder::load_track(path.to_str().unwrap()).unwrap();
    let mut chunk = Vec::new();
    let read = buffer.read_frames(0, buffer.total_frames(), &mut chunk);
    assert_eq!(read, buffer.total_frames());
    assert!(chunk.iter().all(|s| (-1.0..=1.0).contains(s)));
    // A 440 Hz tone at amplitude 0.5 actually moves
    assert!(chunk.iter().any(|s| s.abs() > 0.4));
}

#[test]
fn test_probe_duration_matches_content() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "tone.wav", SAMPLE_RATE, 1.5);

    let duration = decoder::probe_duration(path.to_str().unwrap()).unwrap();
    assert!((duration - 1.5).abs() < 0.05, "probed {}", duration);
}

#[tokio::test]
async fn test_engine_load_seek_position() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(dir.path(), "tone.wav", SAMPLE_RATE, 2.0);
    let uri = path.to_str().unwrap().to_string();

    let (engine, _notices) = Engine::new();
    engine.load(&uri).await.unwrap();

    assert_eq!(engine.current_uri().as_deref(), Some(uri.as_str()));
    assert!((engine.duration().unwrap() - 2.0).abs() < 0.01);
    assert_eq!(engine.position(), 0.0);

    engine.seek(0.5);
    assert!((engine.position() - 0.5).abs() < 0.001);

    // Seeks clamp inside the track
    engine.seek(100.0);
    assert!(engine.position() <= engine.duration().unwrap());
    engine.seek(-4.0);
    assert_eq!(engine.position(), 0.0);

    // Loading another file resets the cursor
    let other = write_wav(dir.path(), "other.wav", SAMPLE_RATE, 1.0);
    engine.load(other.to_str().unwrap()).await.unwrap();
    assert_eq!(engine.position(), 0.0);
    assert!((engine.duration().unwrap() - 1.0).abs() < 0.01);

    engine.shutdown();
}
