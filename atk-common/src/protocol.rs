//! Protocol message types for ATK IPC
//!
//! The transport is UTF-8 JSON, one object per line, `\n`-terminated.
//! Requests carry a client-chosen correlation id; responses echo it.
//! Events carry no id and are pushed to subscribers unsolicited.

use crate::error::{Error, ErrorInfo, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire protocol version carried in every message
pub const PROTOCOL_VERSION: u32 = 1;

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

fn default_id() -> String {
    "unknown".to_string()
}

/// Protocol request message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    #[serde(default = "default_version")]
    pub v: u32,
    #[serde(default = "default_id")]
    pub id: String,
    pub cmd: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl Request {
    /// Build a request with the given id, command, and argument map
    pub fn new(id: impl Into<String>, cmd: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: id.into(),
            cmd: cmd.into(),
            args,
        }
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Protocol response message, correlated by request id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    #[serde(default = "default_version")]
    pub v: u32,
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Response {
    pub fn success(request_id: impl Into<String>, data: Value) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: request_id.into(),
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(request_id: impl Into<String>, error: ErrorInfo) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            id: request_id.into(),
            ok: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Event types emitted by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TrackChanged,
    PlaybackStarted,
    PlaybackPaused,
    PlaybackStopped,
    QueueUpdated,
    PositionUpdate,
    QueueFinished,
    Error,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventType::TrackChanged => "track_changed",
            EventType::PlaybackStarted => "playback_started",
            EventType::PlaybackPaused => "playback_paused",
            EventType::PlaybackStopped => "playback_stopped",
            EventType::QueueUpdated => "queue_updated",
            EventType::PositionUpdate => "position_update",
            EventType::QueueFinished => "queue_finished",
            EventType::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Protocol event message, pushed to subscribers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(default = "default_version")]
    pub v: u32,
    pub event: EventType,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    pub fn new(event: EventType, data: Value) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            event,
            data,
        }
    }

    pub fn serialize(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Any message that can travel over the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Response(Response),
    Event(Event),
}

/// Parse a JSON line into the appropriate message type.
///
/// Messages are duck-typed by key presence: `cmd` marks a request,
/// `event` an event, `ok` a response.
pub fn parse_message(line: &str) -> Result<Message> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Error::Transport(format!("malformed JSON: {}", e)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| Error::Transport("message is not a JSON object".to_string()))?;

    if obj.contains_key("cmd") {
        let request = serde_json::from_value(value.clone())
            .map_err(|e| Error::Transport(format!("bad request: {}", e)))?;
        Ok(Message::Request(request))
    } else if obj.contains_key("event") {
        let event = serde_json::from_value(value.clone())
            .map_err(|e| Error::Transport(format!("bad event: {}", e)))?;
        Ok(Message::Event(event))
    } else if obj.contains_key("ok") {
        let response = serde_json::from_value(value.clone())
            .map_err(|e| Error::Transport(format!("bad response: {}", e)))?;
        Ok(Message::Response(response))
    } else {
        Err(Error::Transport("unknown message type".to_string()))
    }
}

/// Extract the request id from a possibly malformed line, for error replies.
pub fn request_id_of(line: &str) -> String {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
