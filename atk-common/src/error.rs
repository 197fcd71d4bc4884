//! Common error types for ATK
//!
//! Every variant maps to a stable wire code and a category so failure
//! responses stay consistent across daemon versions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for ATK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced through the IPC protocol
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed command arguments
    #[error("{0}")]
    InvalidArgs(String),

    /// Command name not in the dispatch table
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Queue index out of range
    #[error("{0}")]
    InvalidIndex(String),

    /// Path does not exist at play/add time
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Extension not in the recognised set
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Decoder failed on an otherwise valid-looking file
    #[error("Decode error: {0}")]
    Decode(String),

    /// Malformed JSON or missing required message fields
    #[error("Invalid message: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable wire code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidArgs(_) => "INVALID_ARGS",
            Error::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Error::InvalidIndex(_) => "INVALID_INDEX",
            Error::FileNotFound(_) => "FILE_NOT_FOUND",
            Error::UnsupportedFormat(_) => "INVALID_FORMAT",
            Error::Decode(_) => "DECODE_ERROR",
            Error::Transport(_) => "INVALID_MESSAGE",
            Error::Io(_) => "READ_ERROR",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Coarse category for logging and client display
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidArgs(_) | Error::UnknownCommand(_) | Error::Transport(_) => "protocol",
            Error::InvalidIndex(_) => "queue",
            Error::FileNotFound(_) | Error::Io(_) => "io",
            Error::UnsupportedFormat(_) | Error::Decode(_) => "playback",
            Error::Internal(_) => "internal",
        }
    }

    /// Build the wire-level error payload
    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code().to_string(),
            category: self.category().to_string(),
            message: self.to_string(),
        }
    }
}

/// Error information carried in a failure response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub category: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_unique() {
        use std::collections::HashSet;

        let errors = vec![
            Error::InvalidArgs("x".into()),
            Error::UnknownCommand("x".into()),
            Error::InvalidIndex("x".into()),
            Error::FileNotFound("x".into()),
            Error::UnsupportedFormat("x".into()),
            Error::Decode("x".into()),
            Error::Transport("x".into()),
            Error::Internal("x".into()),
        ];

        let codes: HashSet<_> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len(), "Error codes must be unique");
    }

    #[test]
    fn test_error_info_round_trip() {
        let info = Error::FileNotFound("/music/a.mp3".into()).to_info();
        assert_eq!(info.code, "FILE_NOT_FOUND");
        assert_eq!(info.category, "io");

        let json = serde_json::to_string(&info).unwrap();
        let back: ErrorInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
