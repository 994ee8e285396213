//! Process lifecycle management for agent daemons
//!
//! One PID record per agent name lives under the runtime directory
//! ($XDG_RUNTIME_DIR/sotto/<agent>.pid). The record enforces single-instance
//! execution: acquire refuses when the recorded PID is alive, and a stale
//! record (PID no longer live) is treated as absent, not as a conflict.
//!
//! Liveness probing and signal delivery are inherently racy across
//! processes; a process may exit between the probe and the signal, so a
//! signal landing on a dead PID counts as success.

use crate::config::Config;
use crate::error::ProcessError;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

/// Ceiling on the wait for a stopped worker to exit. Generous: a stop can
/// land while a transcript is still being finalized downstream.
const STOP_WAIT: Duration = Duration::from_secs(10);

/// Liveness poll interval while waiting
const STOP_POLL: Duration = Duration::from_millis(100);

/// Reported agent state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Running(u32),
    NotRunning,
}

/// Outcome of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// A live worker was signaled and has exited
    Stopped(u32),
    /// Nothing was running (no record, or a stale one)
    NotRunning,
}

/// PID record for one named agent
pub struct PidFile {
    agent: String,
    path: PathBuf,
}

/// Removes the PID record when the owning agent loop ends, on every exit path
pub struct PidGuard {
    path: PathBuf,
}

impl PidFile {
    /// Record for an agent in the standard runtime directory
    pub fn for_agent(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            path: Config::runtime_dir().join(format!("{}.pid", agent)),
        }
    }

    /// Record at a custom path (used by tests)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let agent = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "agent".to_string());
        Self { agent, path }
    }

    /// The record's path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the recorded PID, if the record exists and is well-formed
    pub fn read_pid(&self) -> Option<u32> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        contents.trim().parse().ok()
    }

    /// The recorded PID if it is live. A stale record is removed and treated
    /// as absent.
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read_pid()?;
        if pid_alive(pid) {
            Some(pid)
        } else {
            tracing::debug!("Removing stale PID record for '{}' ({})", self.agent, pid);
            self.release();
            None
        }
    }

    /// Probe the agent's state without side effects
    pub fn status(&self) -> AgentStatus {
        match self.read_pid() {
            Some(pid) if pid_alive(pid) => AgentStatus::Running(pid),
            _ => AgentStatus::NotRunning,
        }
    }

    /// Claim the record for the current process.
    ///
    /// Fails with `AlreadyRunning` when another live process holds it. The
    /// returned guard removes the record when dropped.
    pub fn acquire(&self) -> Result<PidGuard, ProcessError> {
        if let Some(pid) = self.running_pid() {
            return Err(ProcessError::AlreadyRunning {
                agent: self.agent.clone(),
                pid,
            });
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProcessError::WriteFailed(e.to_string()))?;
        }

        let pid = std::process::id();
        std::fs::write(&self.path, pid.to_string())
            .map_err(|e| ProcessError::WriteFailed(e.to_string()))?;

        tracing::debug!("PID record written: {:?} (pid={})", self.path, pid);
        Ok(PidGuard {
            path: self.path.clone(),
        })
    }

    /// Remove the record. Best-effort and idempotent.
    pub fn release(&self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove PID record: {}", e);
            }
        }
    }

    /// Stop the recorded worker: send SIGTERM and wait (bounded) for exit.
    ///
    /// "Nothing running" is an expected outcome, not an error. A worker that
    /// outlives the wait ceiling is reported as `StillRunning`.
    pub async fn stop(&self) -> Result<StopOutcome, ProcessError> {
        let Some(pid) = self.read_pid() else {
            return Ok(StopOutcome::NotRunning);
        };

        if !pid_alive(pid) {
            // Stale record: self-heal
            self.release();
            return Ok(StopOutcome::NotRunning);
        }

        match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                // Exited between the probe and the signal
                self.release();
                return Ok(StopOutcome::Stopped(pid));
            }
            Err(e) => {
                return Err(ProcessError::SignalFailed {
                    pid,
                    reason: e.to_string(),
                });
            }
        }

        let deadline = Instant::now() + STOP_WAIT;
        while Instant::now() < deadline {
            if !pid_alive(pid) {
                self.release();
                return Ok(StopOutcome::Stopped(pid));
            }
            tokio::time::sleep(STOP_POLL).await;
        }

        Err(ProcessError::StillRunning(pid))
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove PID record: {}", e);
            } else {
                tracing::debug!("PID record removed: {:?}", self.path);
            }
        }
    }
}

/// Probe a PID with the null signal. EPERM means the process exists but
/// belongs to someone else, which still counts as alive.
pub fn pid_alive(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Re-execute the current binary with the given arguments as a detached
/// worker: new process group, stdio disconnected. Returns the worker's PID.
pub fn spawn_detached(args: &[String]) -> Result<u32, ProcessError> {
    use std::os::unix::process::CommandExt;

    let exe =
        std::env::current_exe().map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

    let child = std::process::Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

    Ok(child.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_pid_file(dir: &tempfile::TempDir, agent: &str) -> PidFile {
        PidFile::with_path(dir.path().join(format!("{}.pid", agent)))
    }

    #[test]
    fn test_status_not_running_without_record() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = temp_pid_file(&dir, "transcribe");
        assert_eq!(pid_file.status(), AgentStatus::NotRunning);
    }

    #[test]
    fn test_acquire_writes_own_pid_and_guard_releases() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = temp_pid_file(&dir, "transcribe");

        let guard = pid_file.acquire().unwrap();
        assert_eq!(pid_file.read_pid(), Some(std::process::id()));
        assert_eq!(pid_file.status(), AgentStatus::Running(std::process::id()));

        drop(guard);
        assert!(!pid_file.path().exists());
        assert_eq!(pid_file.status(), AgentStatus::NotRunning);
    }

    #[test]
    fn test_acquire_refuses_live_pid() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = temp_pid_file(&dir, "speak");

        // Current process stands in for the live worker
        std::fs::write(pid_file.path(), std::process::id().to_string()).unwrap();

        match pid_file.acquire() {
            Err(ProcessError::AlreadyRunning { agent, pid }) => {
                assert_eq!(agent, "speak");
                assert_eq!(pid, std::process::id());
            }
            other => panic!("expected AlreadyRunning, got {:?}", other.map(|_| ())),
        }
        // The conflicting record is left in place
        assert!(pid_file.path().exists());
    }

    #[test]
    fn test_stale_record_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = temp_pid_file(&dir, "voice-edit");

        // A reaped child's PID is reliably dead
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        std::fs::write(pid_file.path(), dead_pid.to_string()).unwrap();
        assert!(pid_file.running_pid().is_none());
        assert!(!pid_file.path().exists());

        // And acquire succeeds afterwards
        std::fs::write(pid_file.path(), dead_pid.to_string()).unwrap();
        let _guard = pid_file.acquire().unwrap();
        assert_eq!(pid_file.read_pid(), Some(std::process::id()));
    }

    #[test]
    fn test_garbage_record_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = temp_pid_file(&dir, "transcribe");
        std::fs::write(pid_file.path(), "not a pid").unwrap();
        assert_eq!(pid_file.read_pid(), None);
        assert_eq!(pid_file.status(), AgentStatus::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_when_absent_reports_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = temp_pid_file(&dir, "transcribe");
        assert_eq!(pid_file.stop().await.unwrap(), StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn test_stop_terminates_live_worker() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = temp_pid_file(&dir, "transcribe");

        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        std::fs::write(pid_file.path(), pid.to_string()).unwrap();

        // Reap concurrently: a zombie still answers the liveness probe, and
        // real workers are not our children
        let reaper = std::thread::spawn(move || {
            let _ = child.wait();
        });

        let outcome = pid_file.stop().await.unwrap();
        assert_eq!(outcome, StopOutcome::Stopped(pid));
        assert!(!pid_file.path().exists());
        assert_eq!(pid_file.status(), AgentStatus::NotRunning);

        reaper.join().unwrap();
    }

    #[tokio::test]
    async fn test_stop_with_stale_record_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = temp_pid_file(&dir, "speak");

        let mut child = std::process::Command::new("true").spawn().unwrap();
        let dead_pid = child.id();
        child.wait().unwrap();

        std::fs::write(pid_file.path(), dead_pid.to_string()).unwrap();
        assert_eq!(pid_file.stop().await.unwrap(), StopOutcome::NotRunning);
        assert!(!pid_file.path().exists());
    }
}
