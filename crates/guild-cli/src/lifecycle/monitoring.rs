//! Health snapshot and pid record readers.
//!
//! `guildd` publishes its state as `guildd.health` (JSON) and its process id
//! as `guildd.pid` inside the runtime directory. These helpers read both and
//! poll the snapshot while a freshly spawned process starts.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use cap_std::ambient_authority;
use cap_std::fs::Dir;
use guild_config::RuntimePaths;
use serde::Deserialize;

use super::error::LifecycleError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Operational state reported by the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DaemonStatus {
    Starting,
    Ready,
    Stopping,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
        })
    }
}

/// Contents of `guildd.health`.
#[derive(Debug, Deserialize, PartialEq, Eq)]
pub(crate) struct HealthSnapshot {
    pub status: DaemonStatus,
    pub pid: u32,
    /// Seconds since the Unix epoch when the snapshot was written.
    pub timestamp: u64,
}

/// Result of evaluating a health snapshot during startup.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum HealthCheckOutcome {
    Ready(HealthSnapshot),
    Aborted { path: PathBuf },
    Continue,
}

/// Context for judging whether a snapshot belongs to the spawned process.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcessMonitorContext {
    pub started_at: SystemTime,
    pub expected_pid: u32,
    /// Set once the spawned process exited cleanly after forking; its pid no
    /// longer identifies the worker.
    pub daemonized: bool,
}

pub(super) fn open_runtime_dir(paths: &RuntimePaths) -> Result<Dir, LifecycleError> {
    Dir::open_ambient_dir(paths.runtime_dir(), ambient_authority()).map_err(|source| {
        LifecycleError::OpenRuntimeDir {
            path: paths.runtime_dir().to_path_buf(),
            source,
        }
    })
}

fn read_optional(dir: &Dir, path: &Path) -> io::Result<Option<String>> {
    let Some(name) = path.file_name() else {
        return Ok(None);
    };
    match dir.read_to_string(name) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Reads `guildd.health`; `None` when the file does not exist.
pub(super) fn read_health(
    dir: &Dir,
    path: &Path,
) -> Result<Option<HealthSnapshot>, LifecycleError> {
    let content = read_optional(dir, path).map_err(|source| LifecycleError::ReadHealth {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .map(|text| {
            serde_json::from_str(&text).map_err(|source| LifecycleError::ParseHealth {
                path: path.to_path_buf(),
                source,
            })
        })
        .transpose()
}

/// Reads `guildd.pid`.
///
/// A missing, empty, unreadable, or malformed record is reported as
/// [`LifecycleError::PidUnavailable`].
pub(super) fn read_pid(paths: &RuntimePaths) -> Result<u32, LifecycleError> {
    let path = paths.pid_path();
    let unavailable = |detail: String| LifecycleError::PidUnavailable {
        path: path.to_path_buf(),
        detail,
    };
    if !paths.runtime_dir().is_dir() {
        return Err(unavailable(String::from("runtime directory does not exist")));
    }
    let dir = open_runtime_dir(paths)?;
    let content = read_optional(&dir, path)
        .map_err(|error| unavailable(error.to_string()))?
        .ok_or_else(|| unavailable(String::from("pid file is missing")))?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(unavailable(String::from("pid file is empty")));
    }
    match trimmed.parse::<u32>() {
        Ok(0) => Err(unavailable(String::from("pid file records pid 0"))),
        Ok(pid) => Ok(pid),
        Err(error) => Err(unavailable(format!("'{trimmed}' is not a pid: {error}"))),
    }
}

/// Waits for the spawned worker process to report `ready`.
///
/// Fails when the spawned process exits unsuccessfully, when the snapshot
/// reports `stopping`, or when `timeout` elapses.
pub(super) fn wait_for_ready(
    paths: &RuntimePaths,
    child: &mut Child,
    started_at: SystemTime,
    timeout: Duration,
) -> Result<HealthSnapshot, LifecycleError> {
    let dir = open_runtime_dir(paths)?;
    let deadline = Instant::now() + timeout;
    let expected_pid = child.id();
    let mut daemonized = false;
    while Instant::now() < deadline {
        // Child status first, so a fork is noticed before the pid comparison.
        if let Some(status) = child
            .try_wait()
            .map_err(|source| LifecycleError::MonitorChild { source })?
        {
            if !status.success() {
                return Err(LifecycleError::StartupFailed {
                    exit_status: status.code(),
                });
            }
            daemonized = true;
        }
        let monitor = ProcessMonitorContext {
            started_at,
            expected_pid,
            daemonized,
        };
        match check_health_snapshot(&dir, paths, monitor)? {
            HealthCheckOutcome::Ready(snapshot) => return Ok(snapshot),
            HealthCheckOutcome::Aborted { path } => {
                return Err(LifecycleError::StartupAborted { path });
            }
            HealthCheckOutcome::Continue => {}
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::StartupTimeout {
        health_path: paths.health_path().to_path_buf(),
        timeout_ms: timeout.as_millis(),
    })
}

/// Evaluates the current snapshot for readiness or failure.
pub(crate) fn check_health_snapshot(
    dir: &Dir,
    paths: &RuntimePaths,
    monitor: ProcessMonitorContext,
) -> Result<HealthCheckOutcome, LifecycleError> {
    let Some(snapshot) = read_health(dir, paths.health_path())? else {
        return Ok(HealthCheckOutcome::Continue);
    };
    let pid_ok = monitor.daemonized || snapshot.pid == monitor.expected_pid;
    if !pid_ok || !snapshot_is_recent(&snapshot, monitor.started_at)? {
        return Ok(HealthCheckOutcome::Continue);
    }
    Ok(match snapshot.status {
        DaemonStatus::Ready => HealthCheckOutcome::Ready(snapshot),
        DaemonStatus::Stopping => HealthCheckOutcome::Aborted {
            path: paths.health_path().to_path_buf(),
        },
        DaemonStatus::Starting => HealthCheckOutcome::Continue,
    })
}

pub(crate) fn snapshot_is_recent(
    snapshot: &HealthSnapshot,
    started_at: SystemTime,
) -> Result<bool, LifecycleError> {
    // Snapshots carry whole seconds only.
    let started_secs = started_at
        .duration_since(UNIX_EPOCH)
        .map_err(|_| LifecycleError::InvalidSystemClock { time: started_at })?
        .as_secs();
    Ok(snapshot.timestamp >= started_secs)
}

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;
