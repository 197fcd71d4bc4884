//! Configuration loading
//!
//! A small TOML file supplies defaults (log level, directory overrides,
//! preferred device); command-line arguments override the file. A missing
//! config file is not an error, the defaults stand.

use atk_common::error::{Error, Result};
use atk_common::paths;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Values as they appear in the TOML file; every key optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub log_level: Option<String>,
    pub runtime_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub device: Option<String>,
}

/// Effective daemon configuration after overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub runtime_dir: PathBuf,
    pub state_dir: PathBuf,
    pub data_dir: PathBuf,
    pub device: Option<String>,
}

impl Config {
    /// Load configuration from an optional TOML file with command-line
    /// overrides layered on top.
    pub fn load(
        config_path: Option<&Path>,
        runtime_dir_override: Option<PathBuf>,
        log_level_override: Option<String>,
        device_override: Option<String>,
    ) -> Result<Self> {
        let toml_config = match config_path {
            Some(path) if path.exists() => {
                let toml_str = std::fs::read_to_string(path)?;
                toml::from_str(&toml_str)
                    .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", path.display(), e)))?
            }
            Some(path) => {
                debug!("Config file {} not found, using defaults", path.display());
                TomlConfig::default()
            }
            None => TomlConfig::default(),
        };

        Ok(Config {
            log_level: log_level_override
                .or(toml_config.log_level)
                .unwrap_or_else(|| "info".to_string()),
            runtime_dir: runtime_dir_override
                .or(toml_config.runtime_dir)
                .unwrap_or_else(paths::runtime_dir),
            state_dir: toml_config.state_dir.unwrap_or_else(paths::state_dir),
            data_dir: toml_config.data_dir.unwrap_or_else(paths::data_dir),
            device: device_override.or(toml_config.device),
        })
    }

    /// Default tracing filter directive for this configuration.
    pub fn log_filter(&self) -> String {
        format!("atk={}", self.log_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let config = Config::load(None, None, None, None).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_filter(), "atk=info");
        assert!(config.device.is_none());
    }

    #[test]
    fn test_file_values_and_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\nruntime_dir = \"/run/custom\"\ndevice = \"USB DAC\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path), None, None, None).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.runtime_dir, PathBuf::from("/run/custom"));
        assert_eq!(config.device.as_deref(), Some("USB DAC"));

        // CLI overrides win over the file
        let config = Config::load(
            Some(&path),
            Some(PathBuf::from("/run/cli")),
            Some("trace".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(config.runtime_dir, PathBuf::from("/run/cli"));
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.device.as_deref(), Some("USB DAC"));
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let config = Config::load(Some(Path::new("/nonexistent/atk.toml")), None, None, None);
        assert!(config.is_ok());
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_level = [not toml").unwrap();
        assert!(Config::load(Some(&path), None, None, None).is_err());
    }
}
