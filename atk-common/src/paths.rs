//! Runtime, state, and data directory resolution
//!
//! Each directory honours an `ATK_*` environment override first, then the
//! platform base directory, then a `/tmp` fallback for the runtime dir.

use std::env;
use std::path::PathBuf;

/// Directory for pipes and the PID file
pub fn runtime_dir() -> PathBuf {
    if let Ok(dir) = env::var("ATK_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = dirs::runtime_dir() {
        return dir.join("atk");
    }
    let user = env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/atk-{}", user))
}

/// Directory for logs
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = env::var("ATK_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = dirs::state_dir() {
        return dir.join("atk");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local/state/atk")
}

/// Directory for playlists and persisted session state
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = env::var("ATK_DATA_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(dir) = dirs::data_dir() {
        return dir.join("atk");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".local/share/atk")
}
