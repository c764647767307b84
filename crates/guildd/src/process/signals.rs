//! Control signals delivered by the supervisor.
//!
//! `SIGUSR1` asks for a restart through socket handoff; `SIGINT`, `SIGTERM`,
//! `SIGQUIT`, and `SIGHUP` ask for a graceful stop.

use std::io;
use std::sync::{Mutex, PoisonError};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// What the supervisor asked the worker process to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop serving and exit.
    Shutdown,
    /// Hand listeners to a successor, then exit.
    Restart,
}

impl ControlSignal {
    fn from_raw(signal: i32) -> Self {
        if signal == SIGUSR1 {
            Self::Restart
        } else {
            Self::Shutdown
        }
    }
}

/// Abstraction over control signal delivery.
pub trait SignalSource: Send + Sync {
    /// Starts listening so signals arriving before [`SignalSource::wait`]
    /// are not lost.
    fn install(&self) -> Result<(), SignalError> {
        Ok(())
    }

    /// Blocks until the next control signal arrives.
    fn wait(&self) -> Result<ControlSignal, SignalError>;
}

/// Errors reported by signal listeners.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal iterator ended.
    #[error("signal delivery closed")]
    Closed,
}

/// Signal source backed by `signal-hook`.
#[derive(Default)]
pub struct SystemSignals {
    signals: Mutex<Option<Signals>>,
}

impl SystemSignals {
    /// Builds a listener; handlers are registered by
    /// [`SignalSource::install`] or the first wait.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SignalSource for SystemSignals {
    fn install(&self) -> Result<(), SignalError> {
        let mut slot = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP, SIGUSR1])
                .map_err(|source| SignalError::Install { source })?;
            *slot = Some(signals);
        }
        Ok(())
    }

    fn wait(&self) -> Result<ControlSignal, SignalError> {
        self.install()?;
        let mut slot = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        let signals = slot.as_mut().ok_or(SignalError::Closed)?;
        let raw = signals.forever().next().ok_or(SignalError::Closed)?;
        let control = ControlSignal::from_raw(raw);
        info!(
            target: PROCESS_TARGET,
            signal = raw,
            ?control,
            "control signal received"
        );
        Ok(control)
    }
}
