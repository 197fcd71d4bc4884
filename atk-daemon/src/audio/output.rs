//! Audio output using cpal
//!
//! Owns the output device and stream. The render callback fills interleaved
//! stereo f32 frames; conversion to the device's channel layout and sample
//! format happens here. The stream itself is not Send/Sync, so the engine
//! keeps instances of this type on a dedicated audio-host thread.

use atk_common::error::{Error, Result};
use crate::audio::{CHANNELS, SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use serde::Serialize;
use tracing::{debug, info, warn};

/// One playback device as reported to clients.
///
/// The wire id is the hex-encoded device name, so it survives JSON framing
/// regardless of the characters in the name.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// List available playback devices.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();

    let default_name = host
        .default_output_device()
        .and_then(|d| d.name().ok());

    let devices = host
        .output_devices()
        .map_err(|e| Error::Internal(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .map(|name| DeviceInfo {
            id: hex::encode(name.as_bytes()),
            name: name.clone(),
            is_default: default_name.as_deref() == Some(name.as_str()),
        })
        .collect::<Vec<_>>();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Decode a wire device id back into a device name.
pub fn device_name_from_id(id: &str) -> Result<String> {
    let bytes = hex::decode(id)
        .map_err(|e| Error::InvalidArgs(format!("Invalid device id: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::InvalidArgs(format!("Invalid device id: {}", e)))
}

/// Audio output manager wrapping one cpal device and stream.
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl AudioOutput {
    /// Open an output device, the default when `device_name` is None.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::Internal(format!("Failed to enumerate devices: {}", e)))?;
            devices
                .find(|d| d.name().ok().as_deref() == Some(name))
                .ok_or_else(|| Error::Internal(format!("Device '{}' not found", name)))?
        } else {
            host.default_output_device()
                .ok_or_else(|| Error::Internal("No default output device found".to_string()))?
        };

        info!(
            "Using audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let (config, sample_format) = Self::best_config(&device)?;
        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
        })
    }

    /// Pick the output configuration closest to 44.1 kHz stereo f32.
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::Internal(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported.find(|config| {
            config.channels() == CHANNELS as u16
                && config.min_sample_rate().0 <= SAMPLE_RATE
                && config.max_sample_rate().0 >= SAMPLE_RATE
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(SAMPLE_RATE))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::Internal(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    /// Start the stream. `render` is invoked on the audio thread with a
    /// stereo interleaved f32 buffer to fill for each callback.
    pub fn start<F>(&mut self, render: F) -> Result<()>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        info!("Starting audio stream");

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream_f32(render)?,
            SampleFormat::I16 => self.build_stream_i16(render)?,
            SampleFormat::U16 => self.build_stream_u16(render)?,
            other => {
                return Err(Error::Internal(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::Internal(format!("Failed to start stream: {}", e)))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn build_stream_f32<F>(&self, mut render: F) -> Result<Stream>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let mut stereo: Vec<f32> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    stereo.resize(frames * CHANNELS, 0.0);
                    render(&mut stereo);
                    spread_stereo(&stereo, data, channels);
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Internal(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    fn build_stream_i16<F>(&self, mut render: F) -> Result<Stream>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let mut stereo: Vec<f32> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    stereo.resize(frames * CHANNELS, 0.0);
                    render(&mut stereo);
                    for (frame_idx, frame) in data.chunks_mut(channels).enumerate() {
                        let left = stereo[frame_idx * CHANNELS];
                        let right = stereo[frame_idx * CHANNELS + 1];
                        frame[0] = (left * i16::MAX as f32) as i16;
                        if channels > 1 {
                            frame[1] = (right * i16::MAX as f32) as i16;
                        }
                        for extra in frame.iter_mut().skip(2) {
                            *extra = 0;
                        }
                    }
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Internal(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    fn build_stream_u16<F>(&self, mut render: F) -> Result<Stream>
    where
        F: FnMut(&mut [f32]) + Send + 'static,
    {
        let channels = self.config.channels as usize;
        let mut stereo: Vec<f32> = Vec::new();

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    stereo.resize(frames * CHANNELS, 0.0);
                    render(&mut stereo);
                    for (frame_idx, frame) in data.chunks_mut(channels).enumerate() {
                        let left = stereo[frame_idx * CHANNELS];
                        let right = stereo[frame_idx * CHANNELS + 1];
                        // Map [-1.0, 1.0] to [0, 65535]
                        frame[0] = ((left + 1.0) * 32767.5) as u16;
                        if channels > 1 {
                            frame[1] = ((right + 1.0) * 32767.5) as u16;
                        }
                        for extra in frame.iter_mut().skip(2) {
                            *extra = 32768;
                        }
                    }
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Internal(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    /// Stop and drop the stream.
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Stopping audio stream");
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream: {}", e);
            }
            drop(stream);
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Copy rendered stereo frames into a device buffer with `channels` channels.
/// Extra channels are silenced; mono devices get the left channel.
fn spread_stereo(stereo: &[f32], data: &mut [f32], channels: usize) {
    if channels == CHANNELS {
        data.copy_from_slice(stereo);
        return;
    }
    for (frame_idx, frame) in data.chunks_mut(channels).enumerate() {
        frame[0] = stereo[frame_idx * CHANNELS];
        if channels > 1 {
            frame[1] = stereo[frame_idx * CHANNELS + 1];
        }
        for extra in frame.iter_mut().skip(2) {
            *extra = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_round_trip() {
        let name = "Built-in Audio Analog Stereo";
        let id = hex::encode(name.as_bytes());
        assert_eq!(device_name_from_id(&id).unwrap(), name);
    }

    #[test]
    fn test_device_id_rejects_garbage() {
        assert!(device_name_from_id("not hex").is_err());
        assert!(device_name_from_id("ff00").is_err()); // not UTF-8
    }

    #[test]
    fn test_spread_stereo_mono() {
        let stereo = vec![0.1, 0.2, 0.3, 0.4];
        let mut data = vec![0.0; 2];
        spread_stereo(&stereo, &mut data, 1);
        assert_eq!(data, vec![0.1, 0.3]);
    }

    #[test]
    fn test_spread_stereo_quad() {
        let stereo = vec![0.1, 0.2];
        let mut data = vec![9.0; 4];
        spread_stereo(&stereo, &mut data, 4);
        assert_eq!(data, vec![0.1, 0.2, 0.0, 0.0]);
    }

    #[test]
    fn test_list_devices_does_not_panic() {
        // Enumeration may fail without audio hardware; either outcome is fine
        let _ = list_devices();
    }
}
