//! Supervises worker process launch, the serve loop, and restarts.

use std::env;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::sync::Arc;

use nix::unistd::{close, dup2};
use tracing::{info, warn};

use guild_config::{Config, RuntimePaths, SocketEndpoint};
use guild_workers::{WorkerStore, Workers};

use crate::StructuredHealthReporter;
use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::{AdminService, DispatchConnectionHandler, LocalExtenders, MutationGate};
use crate::handoff::{
    HANDOFF_ENV_VAR, Outgoing, ProcessSuccessor, READY_LINE, SuccessorLauncher,
};
use crate::health::HealthReporter;
use crate::service::ServiceConnectionHandler;
use crate::traffic::{Traffic, TrafficError, TrafficSet, read_traffic};
use crate::transport::{ConnectionHandler, ListenerHandle, SocketListener};

use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::{HealthState, ProcessGuard};
use super::signals::{ControlSignal, SignalSource, SystemSignals};
use super::{DRAIN_TIMEOUT, FOREGROUND_ENV_VAR, PROCESS_TARGET};

/// Launch mode for the worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Fork into the background and detach from the controlling terminal.
    Background,
    /// Remain attached to the terminal; used by successors and tests.
    Foreground,
}

impl LaunchMode {
    fn detect() -> Self {
        if env::var_os(FOREGROUND_ENV_VAR).is_some() {
            Self::Foreground
        } else {
            Self::Background
        }
    }
}

/// Channel back to the process that launched this one as its successor.
pub(crate) trait Predecessor: Send {
    /// Reads the inherited descriptor set.
    fn traffic(&mut self) -> Result<TrafficSet, TrafficError>;

    /// Tells the predecessor this process is serving.
    fn acknowledge(&mut self) -> io::Result<()>;
}

/// Write end of the acknowledgement pipe, moved off stdout.
///
/// Once detached, everything this process prints to stdout (access lines
/// included) lands on stderr, so the predecessor only ever reads
/// [`READY_LINE`].
struct AckChannel {
    pipe: File,
}

impl AckChannel {
    /// Moves the pipe held at `slot` to a fresh descriptor and points `slot`
    /// at `fallback`.
    fn detach(slot: BorrowedFd<'_>, fallback: BorrowedFd<'_>) -> io::Result<Self> {
        let pipe = slot.try_clone_to_owned()?;
        dup2(fallback.as_raw_fd(), slot.as_raw_fd()).map_err(io::Error::from)?;
        Ok(Self {
            pipe: File::from(pipe),
        })
    }

    /// Writes the acknowledgement and closes the pipe.
    fn acknowledge(mut self) -> io::Result<()> {
        self.pipe.write_all(READY_LINE.as_bytes())?;
        self.pipe.flush()
    }
}

/// Predecessor reached through stdin and a pipe detached from stdout.
struct StdioPredecessor {
    ack: Option<AckChannel>,
}

impl StdioPredecessor {
    fn new() -> Result<Self, LaunchError> {
        let mut stdout = io::stdout().lock();
        let ack = stdout
            .flush()
            .and_then(|()| AckChannel::detach(stdout.as_fd(), io::stderr().as_fd()))
            .map_err(|source| LaunchError::AckChannel { source })?;
        Ok(Self { ack: Some(ack) })
    }
}

impl Predecessor for StdioPredecessor {
    fn traffic(&mut self) -> Result<TrafficSet, TrafficError> {
        read_traffic(io::stdin().lock())
    }

    fn acknowledge(&mut self) -> io::Result<()> {
        self.ack.take().map_or_else(
            || {
                Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "predecessor already acknowledged",
                ))
            },
            AckChannel::acknowledge,
        )
    }
}

/// How this process came to be started.
pub(crate) enum Start {
    /// Fresh start; endpoints are bound.
    Cold,
    /// Started by a running predecessor handing over its listeners.
    Successor(Box<dyn Predecessor>),
}

impl Start {
    fn detect() -> Result<Self, LaunchError> {
        if env::var_os(HANDOFF_ENV_VAR).is_some() {
            Ok(Self::Successor(Box::new(StdioPredecessor::new()?)))
        } else {
            Ok(Self::Cold)
        }
    }
}

/// Process-level collaborators needed to control the worker lifecycle.
pub(crate) struct ProcessControl<D, S> {
    pub(crate) mode: LaunchMode,
    pub(crate) start: Start,
    pub(crate) daemonizer: D,
    pub(crate) signals: S,
}

/// Service dependencies required to construct the worker runtime.
pub(crate) struct ServiceDeps<L, H> {
    pub(crate) loader: L,
    pub(crate) reporter: Arc<dyn HealthReporter>,
    pub(crate) launcher: H,
}

/// Collaborators required to launch the worker process.
pub(crate) struct LaunchPlan<L, D, S, H> {
    pub(crate) process: ProcessControl<D, S>,
    pub(crate) services: ServiceDeps<L, H>,
}

/// Runs the worker process using the production collaborators.
///
/// # Errors
///
/// Returns a [`LaunchError`] when the process cannot start, serve, or shut
/// down cleanly.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        process: ProcessControl {
            mode: LaunchMode::detect(),
            start: Start::detect()?,
            daemonizer: SystemDaemonizer::new(),
            signals: SystemSignals::new(),
        },
        services: ServiceDeps {
            loader: SystemConfigLoader,
            reporter: Arc::new(StructuredHealthReporter::new()),
            launcher: ProcessSuccessor::current()?,
        },
    };
    run_daemon_with(plan)
}

/// Runs the worker process with injected collaborators.
pub(crate) fn run_daemon_with<L, D, S, H>(plan: LaunchPlan<L, D, S, H>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    D: Daemonizer,
    S: SignalSource,
    H: SuccessorLauncher,
{
    let LaunchPlan { process, services } = plan;
    let ProcessControl {
        mode,
        start,
        daemonizer,
        signals,
    } = process;
    let ServiceDeps {
        loader,
        reporter,
        launcher,
    } = services;

    let runtime = bootstrap_with(&loader, reporter.as_ref())?;
    let config = runtime.config().clone();
    let workers = Arc::clone(runtime.workers());
    info!(
        target: PROCESS_TARGET,
        ?mode,
        successor = matches!(start, Start::Successor(_)),
        "starting worker process"
    );

    let paths = RuntimePaths::from_config(&config)?;
    let (mut guard, predecessor, traffic) = match start {
        Start::Successor(mut predecessor) => {
            let traffic = predecessor.traffic()?;
            (ProcessGuard::inherit(paths)?, Some(predecessor), traffic)
        }
        Start::Cold => {
            let mut guard = ProcessGuard::acquire(paths)?;
            if matches!(mode, LaunchMode::Background) {
                daemonizer.daemonize(guard.paths())?;
            }
            guard.write_pid(std::process::id())?;
            guard.write_health(HealthState::Starting)?;
            (guard, None, TrafficSet::default())
        }
    };

    let store = if traffic.worker_store.is_empty() {
        WorkerStore::load(config.worker_store().as_std_path())?
    } else {
        WorkerStore::from_slice(&traffic.worker_store, config.worker_store().as_std_path())?
    };
    reporter.workers_loaded(workers.load(store));

    let gate = Arc::new(MutationGate::default());
    let admin: Arc<dyn ConnectionHandler> = Arc::new(DispatchConnectionHandler::new(Arc::new(
        AdminService::new(
            Arc::clone(&workers),
            config.worker_store().as_std_path(),
            Box::new(LocalExtenders::from_config(&config)?),
        )
        .with_gate(Arc::clone(&gate)),
    )));
    let service: Arc<dyn ConnectionHandler> =
        Arc::new(ServiceConnectionHandler::new(Arc::clone(runtime.gateway())));
    let endpoints = endpoints(&config);
    let mut handles = Vec::with_capacity(endpoints.len());
    for (position, listener) in open_listeners(&endpoints, &traffic.traffic)?
        .into_iter()
        .enumerate()
    {
        let handler = if position == 0 { &admin } else { &service };
        handles.push(listener.start(Arc::clone(handler))?);
    }

    signals.install()?;
    // The runtime files stay with the predecessor until it has been told to
    // retire.
    if let Some(mut predecessor) = predecessor {
        predecessor
            .acknowledge()
            .map_err(|source| LaunchError::Acknowledge { source })?;
        guard.take_over(std::process::id())?;
    }
    guard.write_health(HealthState::Ready)?;
    info!(
        target: PROCESS_TARGET,
        listeners = handles.len(),
        "worker process ready"
    );

    loop {
        match signals.wait()? {
            ControlSignal::Restart => {
                let handoff = Handoff {
                    workers: &workers,
                    gate: &gate,
                    config: &config,
                    reporter: reporter.as_ref(),
                };
                if handoff.run(&handles, &launcher)? {
                    retire(handles, &workers);
                    guard.disarm();
                    info!(target: PROCESS_TARGET, "handed over to successor");
                    return Ok(());
                }
                reclaim(&mut guard);
            }
            ControlSignal::Shutdown => break,
        }
    }

    guard.write_health(HealthState::Stopping)?;
    stop(handles);
    if let Err(error) = workers.store().save(config.worker_store().as_std_path()) {
        warn!(target: PROCESS_TARGET, %error, "failed to save worker store");
    }
    let stopped = workers.shutdown();
    info!(
        target: PROCESS_TARGET,
        workers = stopped,
        "shutdown sequence completed"
    );
    Ok(())
}

/// Admin endpoint first, then service endpoints in configured order.
fn endpoints(config: &Config) -> Vec<SocketEndpoint> {
    std::iter::once(config.admin_socket())
        .chain(config.listen())
        .cloned()
        .collect()
}

/// Adopts inherited descriptors matching `endpoints` and binds the rest.
///
/// Inherited descriptors no endpoint claims are closed.
fn open_listeners(
    endpoints: &[SocketEndpoint],
    inherited: &[Traffic],
) -> Result<Vec<SocketListener>, LaunchError> {
    let mut remaining: Vec<(Option<SocketEndpoint>, RawFd)> = Vec::with_capacity(inherited.len());
    for traffic in inherited {
        let fd = traffic.raw_fd()?;
        match traffic.endpoint() {
            Ok(endpoint) => remaining.push((Some(endpoint), fd)),
            Err(error) => {
                warn!(target: PROCESS_TARGET, %error, fd, "unusable inherited descriptor");
                remaining.push((None, fd));
            }
        }
    }

    let mut listeners = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let matched = remaining
            .iter()
            .position(|(inherited, _)| inherited.as_ref() == Some(endpoint));
        let listener = match matched {
            Some(position) => {
                let (_, fd) = remaining.swap_remove(position);
                SocketListener::adopt(endpoint, fd)?
            }
            None => SocketListener::bind(endpoint)?,
        };
        listeners.push(listener);
    }

    for (endpoint, fd) in remaining {
        warn!(
            target: PROCESS_TARGET,
            fd,
            endpoint = endpoint.as_ref().map(ToString::to_string).unwrap_or_default(),
            "closing inherited descriptor no endpoint claims"
        );
        if let Err(error) = close(fd) {
            warn!(target: PROCESS_TARGET, %error, fd, "failed to close inherited descriptor");
        }
    }
    Ok(listeners)
}

/// State a restart hands to the successor.
struct Handoff<'a> {
    workers: &'a Workers,
    gate: &'a MutationGate,
    config: &'a Config,
    reporter: &'a dyn HealthReporter,
}

impl Handoff<'_> {
    /// Launches a successor with the live listeners.
    ///
    /// Admin mutations wait from the store snapshot until the outcome is
    /// known and are refused once the successor has acknowledged. Returns
    /// `true` once the successor acknowledged; on any failure this process
    /// keeps serving and `false` is returned.
    fn run<H: SuccessorLauncher>(
        &self,
        handles: &[ListenerHandle],
        launcher: &H,
    ) -> Result<bool, LaunchError> {
        self.reporter.handoff_started(handles.len());
        let frozen = self.gate.freeze();
        let store = self.workers.store().to_vec()?;
        let outcome = Outgoing::describe(handles, store)
            .and_then(|outgoing| launcher.launch(&outgoing, self.config.handoff_timeout()));
        match outcome {
            Ok(pid) => {
                frozen.retire();
                self.reporter.handoff_completed(pid);
                Ok(true)
            }
            Err(error) => {
                drop(frozen);
                self.reporter.handoff_aborted(&error);
                Ok(false)
            }
        }
    }
}

/// Records this process in the runtime files again after an abandoned
/// handoff, in case the successor wrote them before it was killed.
fn reclaim(guard: &mut ProcessGuard) {
    let restored = guard
        .write_pid(std::process::id())
        .and_then(|()| guard.write_health(HealthState::Ready));
    if let Err(error) = restored {
        warn!(target: PROCESS_TARGET, %error, "failed to reclaim runtime files");
    }
}

/// Stops accepting without unlinking sockets, drains, and stops workers.
fn retire(handles: Vec<ListenerHandle>, workers: &Workers) {
    for handle in &handles {
        handle.release();
    }
    for handle in &handles {
        handle.drain(DRAIN_TIMEOUT);
    }
    join_all(handles);
    workers.shutdown();
}

fn stop(handles: Vec<ListenerHandle>) {
    for handle in &handles {
        handle.shutdown();
    }
    join_all(handles);
}

fn join_all(handles: Vec<ListenerHandle>) {
    for handle in handles {
        let endpoint = handle.endpoint().to_string();
        if let Err(error) = handle.join() {
            warn!(target: PROCESS_TARGET, %error, endpoint, "listener thread failed");
        }
    }
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
