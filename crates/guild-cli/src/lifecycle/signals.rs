//! Control signal delivery to the recorded worker process.

use std::fmt;
use std::io;

use super::error::LifecycleError;

/// Control requests understood by `guildd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ControlSignal {
    /// `SIGINT`: graceful stop, never escalated to a kill.
    Stop,
    /// `SIGUSR1`: hand the listeners to a fresh successor.
    Restart,
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stop => "SIGINT",
            Self::Restart => "SIGUSR1",
        })
    }
}

#[cfg(unix)]
impl ControlSignal {
    const fn raw(self) -> libc::c_int {
        match self {
            Self::Stop => libc::SIGINT,
            Self::Restart => libc::SIGUSR1,
        }
    }
}

/// Sends `signal` to `pid` and returns without waiting for its effect.
///
/// # Errors
///
/// Returns [`LifecycleError::SignalFailed`] when delivery fails, for example
/// because the process no longer exists.
pub(super) fn signal_daemon(pid: u32, signal: ControlSignal) -> Result<(), LifecycleError> {
    #[cfg(unix)]
    {
        let Ok(raw_pid) = libc::pid_t::try_from(pid) else {
            return Err(LifecycleError::SignalFailed {
                pid,
                source: io::Error::from(io::ErrorKind::InvalidInput),
            });
        };
        // SAFETY: `kill(2)` is memory-safe for any pid; failures are reported
        // through errno.
        let result = unsafe { libc::kill(raw_pid, signal.raw()) };
        if result == 0 {
            Ok(())
        } else {
            Err(LifecycleError::SignalFailed {
                pid,
                source: io::Error::last_os_error(),
            })
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (pid, signal);
        Err(LifecycleError::UnsupportedPlatform)
    }
}
