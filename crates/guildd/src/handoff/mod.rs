//! Zero-downtime restart: listener handoff to a successor process.
//!
//! On a restart signal the running process starts a copy of itself with
//! every listening descriptor placed at fd 3 and upwards, writes a
//! [`TrafficSet`] describing them (plus the worker store) to the successor's
//! stdin, and waits a bounded time for the successor to print
//! [`READY_LINE`]. Only then does the running process stop accepting. On any
//! failure the successor is killed and the running process keeps serving.

use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::process::FOREGROUND_ENV_VAR;
use crate::traffic::{Traffic, TrafficSet, encode_traffic};
use crate::transport::ListenerHandle;

/// Environment marker telling a process to read inherited traffic on stdin.
pub const HANDOFF_ENV_VAR: &str = "GUILD_HANDOFF";
/// Acknowledgement a successor prints once its listeners are live.
pub const READY_LINE: &str = "ready\n";
/// First descriptor number used for inherited listeners.
pub const FIRST_INHERITED_FD: RawFd = 3;

const HANDOFF_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::handoff");
const REAP_POLL: Duration = Duration::from_millis(20);

/// Errors that abort a handoff.
#[derive(Debug, Error)]
pub enum HandoffError {
    /// The current executable could not be located.
    #[error("failed to locate current executable: {source}")]
    Executable {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Too many listeners to number.
    #[error("cannot place {count} listeners in the successor's descriptor table")]
    Descriptors {
        /// Listener count.
        count: usize,
    },
    /// Spawning the successor failed.
    #[error("failed to start successor: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing traffic descriptors failed.
    #[error("failed to send traffic to successor: {source}")]
    Write {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading the acknowledgement failed.
    #[error("failed to read successor acknowledgement: {source}")]
    Read {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The successor exited without acknowledging.
    #[error("successor exited before acknowledging: {status}")]
    Exited {
        /// Exit status of the successor.
        status: ExitStatus,
    },
    /// The successor printed something other than the acknowledgement.
    #[error("unexpected successor acknowledgement {line:?}")]
    Unexpected {
        /// Line received.
        line: String,
    },
    /// The successor did not acknowledge in time.
    #[error("successor did not acknowledge within {timeout:?}")]
    Timeout {
        /// Configured bound.
        timeout: Duration,
    },
}

/// Listening descriptors and the payload describing them.
#[derive(Debug)]
pub struct Outgoing {
    /// Descriptors in this process, in the order they must appear in the
    /// successor starting at [`FIRST_INHERITED_FD`].
    pub fds: Vec<RawFd>,
    /// Descriptor set written to the successor's stdin.
    pub traffic: TrafficSet,
}

impl Outgoing {
    /// Describes `listeners` as the successor will see them.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Descriptors`] when the listener count does not
    /// fit a descriptor number.
    pub(crate) fn describe(
        listeners: &[ListenerHandle],
        worker_store: Vec<u8>,
    ) -> Result<Self, HandoffError> {
        let mut fds = Vec::with_capacity(listeners.len());
        let mut traffic = Vec::with_capacity(listeners.len());
        for (fd, listener) in target_fds(listeners.len())?.into_iter().zip(listeners) {
            fds.push(listener.raw_fd());
            traffic.push(Traffic::new(u64::from(fd.unsigned_abs()), listener.endpoint()));
        }
        Ok(Self {
            fds,
            traffic: TrafficSet {
                traffic,
                worker_store,
            },
        })
    }
}

fn target_fds(count: usize) -> Result<Vec<RawFd>, HandoffError> {
    (0..count)
        .map(|offset| {
            RawFd::try_from(offset)
                .ok()
                .and_then(|offset| FIRST_INHERITED_FD.checked_add(offset))
                .ok_or(HandoffError::Descriptors { count })
        })
        .collect()
}

/// Starts a successor and waits for it to acknowledge.
#[cfg_attr(test, mockall::automock)]
pub trait SuccessorLauncher: Send + Sync {
    /// Launches a successor holding `outgoing` and returns its pid once it
    /// acknowledged within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a [`HandoffError`] when the successor cannot be started or
    /// does not acknowledge; no successor is left running in that case.
    fn launch(&self, outgoing: &Outgoing, timeout: Duration) -> Result<u32, HandoffError>;
}

/// Launcher that re-executes a program, by default the current executable
/// with the current arguments.
#[derive(Debug, Clone)]
pub struct ProcessSuccessor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessSuccessor {
    /// Launcher for a copy of the running process.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Executable`] when the executable path is
    /// unavailable.
    pub fn current() -> Result<Self, HandoffError> {
        let program = std::env::current_exe().map_err(|source| HandoffError::Executable { source })?;
        Ok(Self::new(program).with_args(std::env::args_os().skip(1)))
    }

    /// Launcher for an arbitrary program.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn spawn(&self, fds: &[RawFd]) -> Result<Child, HandoffError> {
        let targets = target_fds(fds.len())?;
        let sources = fds.to_vec();
        let mut staged: Vec<RawFd> = vec![-1; sources.len()];
        let floor = targets.last().map_or(FIRST_INHERITED_FD, |last| last.saturating_add(1));

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(HANDOFF_ENV_VAR, "1")
            .env(FOREGROUND_ENV_VAR, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        // SAFETY: the closure runs between fork and exec and only calls
        // async-signal-safe functions on buffers allocated before the fork.
        unsafe {
            command.pre_exec(move || {
                // Fails only for a group leader, which a fresh child is not.
                libc::setsid();
                // Stage every source above the target range first so placing
                // one listener never clobbers another still to be placed.
                for (slot, source) in staged.iter_mut().zip(&sources) {
                    *slot = libc::fcntl(*source, libc::F_DUPFD_CLOEXEC, floor);
                    if *slot < 0 {
                        return Err(io::Error::last_os_error());
                    }
                }
                for (staged_fd, target) in staged.iter().zip(&targets) {
                    if libc::dup2(*staged_fd, *target) < 0 {
                        return Err(io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }
        command.spawn().map_err(|source| HandoffError::Spawn { source })
    }
}

/// Progress reported by the threads talking to a successor.
enum Exchange {
    /// Writing the descriptor set failed.
    Unsent(io::Error),
    /// First stdout line, empty once the successor closed stdout.
    Line(io::Result<String>),
}

impl SuccessorLauncher for ProcessSuccessor {
    fn launch(&self, outgoing: &Outgoing, timeout: Duration) -> Result<u32, HandoffError> {
        let deadline = Instant::now() + timeout;
        let mut child = self.spawn(&outgoing.fds)?;
        let pid = child.id();
        debug!(
            target: HANDOFF_TARGET,
            pid,
            listeners = outgoing.fds.len(),
            "successor started"
        );

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            abandon(&mut child);
            return Err(HandoffError::Write {
                source: io::Error::new(io::ErrorKind::BrokenPipe, "successor stdio missing"),
            });
        };
        // Both directions run off this thread so a successor that never
        // reads or never writes is still bounded by `timeout`.
        let (sender, receiver) = mpsc::channel();
        let payload = encode_traffic(&outgoing.traffic);
        let unsent = sender.clone();
        thread::spawn(move || {
            if let Err(source) = stdin.write_all(&payload).and_then(|()| stdin.flush()) {
                unsent.send(Exchange::Unsent(source)).ok();
            }
        });
        thread::spawn(move || {
            let mut line = String::new();
            let result = BufReader::new(stdout).read_line(&mut line).map(|_| line);
            sender.send(Exchange::Line(result)).ok();
        });

        match receiver.recv_timeout(timeout) {
            Ok(Exchange::Line(Ok(line))) if line == READY_LINE => Ok(pid),
            Ok(Exchange::Line(Ok(line))) if line.is_empty() => {
                Err(reap(&mut child, deadline, timeout))
            }
            Ok(Exchange::Line(Ok(line))) => {
                abandon(&mut child);
                Err(HandoffError::Unexpected { line })
            }
            Ok(Exchange::Line(Err(source))) => {
                abandon(&mut child);
                Err(HandoffError::Read { source })
            }
            Ok(Exchange::Unsent(source)) => {
                abandon(&mut child);
                Err(HandoffError::Write { source })
            }
            Err(_) => {
                abandon(&mut child);
                Err(HandoffError::Timeout { timeout })
            }
        }
    }
}

/// Collects a successor that closed stdout without acknowledging, killing it
/// if it is still running at `deadline`.
fn reap(child: &mut Child, deadline: Instant, timeout: Duration) -> HandoffError {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return HandoffError::Exited { status },
            Ok(None) if Instant::now() < deadline => thread::sleep(REAP_POLL),
            Ok(None) => {
                abandon(child);
                return HandoffError::Timeout { timeout };
            }
            Err(source) => {
                abandon(child);
                return HandoffError::Read { source };
            }
        }
    }
}

fn abandon(child: &mut Child) {
    if let Err(error) = child.kill() {
        warn!(target: HANDOFF_TARGET, error = %error, "failed to kill successor");
    }
    child.wait().ok();
}

#[cfg(test)]
mod tests;
