//! Single-instance enforcement via PID lockfile
//!
//! On startup the daemon refuses to run when the lockfile names a live
//! process; stale state (dead pid, leftover pipes) is cleaned up instead.

use atk_common::error::{Error, Result};
use crate::ipc::{CMD_PIPE, PID_FILE, RESP_PIPE};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Holds the PID lockfile for the daemon's lifetime; removes it on drop.
#[derive(Debug)]
pub struct InstanceLock {
    pid_file: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock in `runtime_dir`.
    ///
    /// Fails when another daemon is alive; removes stale pid files and
    /// pipes left behind by a dead one.
    pub fn acquire(runtime_dir: &Path) -> Result<Self> {
        fs::create_dir_all(runtime_dir)?;
        let pid_file = runtime_dir.join(PID_FILE);

        if pid_file.exists() {
            if let Some(pid) = read_pid(&pid_file) {
                if process_alive(pid) {
                    return Err(Error::Internal(format!(
                        "Another daemon instance is already running (pid {})",
                        pid
                    )));
                }
            }

            warn!("Removing stale daemon state in {}", runtime_dir.display());
            let _ = fs::remove_file(&pid_file);
            let _ = fs::remove_file(runtime_dir.join(CMD_PIPE));
            let _ = fs::remove_file(runtime_dir.join(RESP_PIPE));
        }

        fs::write(&pid_file, std::process::id().to_string())?;
        info!("Wrote PID file {}", pid_file.display());

        Ok(Self { pid_file })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.pid_file);
    }
}

fn read_pid(pid_file: &Path) -> Option<i32> {
    fs::read_to_string(pid_file)
        .ok()?
        .trim()
        .parse::<i32>()
        .ok()
}

/// Probe a process for liveness with signal 0.
fn process_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join(PID_FILE);

        {
            let _lock = InstanceLock::acquire(dir.path()).unwrap();
            assert!(pid_file.exists());
            let stored: u32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
            assert_eq!(stored, std::process::id());
        }

        // Dropping the lock removes the pid file
        assert!(!pid_file.exists());
    }

    #[test]
    fn test_second_instance_refused() {
        let dir = TempDir::new().unwrap();
        let _lock = InstanceLock::acquire(dir.path()).unwrap();

        // Our own process is definitely alive
        let err = InstanceLock::acquire(dir.path()).unwrap_err();
        assert!(err.to_string().contains("already running"));
    }

    #[test]
    fn test_stale_state_cleaned_up() {
        let dir = TempDir::new().unwrap();
        // A pid that cannot exist (pid_max on Linux is < 2^22 by default,
        // and i32::MAX is far above any configurable value)
        fs::write(dir.path().join(PID_FILE), i32::MAX.to_string()).unwrap();
        fs::write(dir.path().join(CMD_PIPE), "").unwrap();
        fs::write(dir.path().join(RESP_PIPE), "").unwrap();

        let _lock = InstanceLock::acquire(dir.path()).unwrap();
        assert!(!dir.path().join(CMD_PIPE).exists());
        assert!(!dir.path().join(RESP_PIPE).exists());
    }

    #[test]
    fn test_unparseable_pid_treated_as_stale() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PID_FILE), "not-a-pid").unwrap();
        let _lock = InstanceLock::acquire(dir.path()).unwrap();
    }
}
