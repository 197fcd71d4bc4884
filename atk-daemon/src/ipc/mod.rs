//! Named-pipe IPC transport
//!
//! One command pipe (client → daemon) and one response pipe (daemon →
//! clients) in the per-user runtime directory, plus a PID lockfile that
//! keeps the daemon single-instance.

pub mod instance;
pub mod pipes;

pub use instance::InstanceLock;
pub use pipes::{Outbound, PipeTransport};

/// Command pipe file name (requests, one JSON object per line)
pub const CMD_PIPE: &str = "atk.cmd";

/// Response pipe file name (responses and events, interleaved)
pub const RESP_PIPE: &str = "atk.resp";

/// PID lockfile name
pub const PID_FILE: &str = "daemon.pid";
