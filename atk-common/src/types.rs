//! Session data types shared between daemon and clients

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
        }
    }
}

/// Repeat modes for playback
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    Queue,
    Track,
}

impl std::fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepeatMode::None => write!(f, "none"),
            RepeatMode::Queue => write!(f, "queue"),
            RepeatMode::Track => write!(f, "track"),
        }
    }
}

/// Rate conversion mode: pitch-preserving time stretch, or tape-style
/// resampling where pitch follows speed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateMode {
    #[default]
    Stretch,
    Tape,
}

impl std::fmt::Display for RateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateMode::Stretch => write!(f, "stretch"),
            RateMode::Tape => write!(f, "tape"),
        }
    }
}

/// Track metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl TrackInfo {
    /// Derive metadata from a path: the file stem is split on the first
    /// " - " into artist and title; otherwise the whole stem is the title.
    pub fn from_path(uri: &str, duration: Option<f64>) -> Self {
        let stem = Path::new(uri)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(uri);

        let (artist, title) = match stem.split_once(" - ") {
            Some((artist, title)) => (Some(artist.to_string()), title.to_string()),
            None => (None, stem.to_string()),
        };

        Self {
            uri: uri.to_string(),
            title: Some(title),
            artist,
            album: None,
            duration,
        }
    }
}

/// Full session status payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusInfo {
    pub state: PlaybackState,
    pub track: Option<TrackInfo>,
    pub position: f64,
    pub duration: f64,
    pub volume: u8,
    pub shuffle: bool,
    pub repeat: RepeatMode,
    pub queue_length: usize,
    pub queue_position: usize,
    pub rate: f32,
}

/// Queue contents payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub tracks: Vec<TrackInfo>,
    pub current_index: usize,
}

/// Playlist summary for the `playlists` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    pub name: String,
    pub track_count: usize,
    pub format: String,
}
