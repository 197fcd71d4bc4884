//! # ATK Common Library
//!
//! Shared code for the ATK daemon and its clients:
//! - Protocol message types (Request/Response/Event line framing)
//! - Error taxonomy with stable wire codes
//! - Track/status/queue data types
//! - Runtime/state/data directory resolution
//! - Time-position parsing and formatting

pub mod error;
pub mod human_time;
pub mod paths;
pub mod protocol;
pub mod types;

pub use error::{Error, Result};
pub use protocol::{Event, EventType, Message, Request, Response, PROTOCOL_VERSION};
pub use types::{PlaybackState, RateMode, RepeatMode, StatusInfo, TrackInfo};
