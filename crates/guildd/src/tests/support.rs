//! Test doubles shared by the behavioural suites.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::net::Shutdown;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use ortho_config::OrthoError;
use serde_json::Value;
use tempfile::TempDir;

use guild_config::{Config, SocketEndpoint};
use guild_workers::LoadSummary;

use crate::bootstrap::{BootstrapError, ConfigLoader};
use crate::handoff::{HandoffError, Outgoing, SuccessorLauncher};
use crate::health::HealthReporter;
use crate::process::daemonizer::{DaemonizeError, Daemonizer};
use crate::process::launch::Predecessor;
use crate::process::signals::{ControlSignal, SignalError, SignalSource};
use crate::traffic::{TrafficError, TrafficSet};
use guild_config::RuntimePaths;

pub(crate) const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Polls `condition` until it holds or the wait times out.
pub(crate) fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    condition()
}

/// Loader that places every runtime file under one temporary directory.
#[derive(Clone)]
pub(crate) struct TestConfigLoader {
    dir: Arc<TempDir>,
    listen: Arc<Mutex<Vec<SocketEndpoint>>>,
}

impl TestConfigLoader {
    pub(crate) fn new() -> Self {
        Self {
            dir: Arc::new(TempDir::new().expect("temporary runtime directory")),
            listen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn add_listener(&self, endpoint: SocketEndpoint) {
        self.listen.lock().expect("listen mutex").push(endpoint);
    }

    pub(crate) fn runtime_dir(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn admin_path(&self) -> PathBuf {
        self.dir.path().join("guildd.sock")
    }

    pub(crate) fn store_path(&self) -> PathBuf {
        self.dir.path().join("workers.json")
    }

    pub(crate) fn runtime_paths(&self) -> RuntimePaths {
        RuntimePaths::in_directory(self.dir.path())
    }
}

fn utf8(path: PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).expect("utf-8 temporary path")
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            admin_socket: SocketEndpoint::unix(utf8(self.admin_path())),
            listen: self.listen.lock().expect("listen mutex").clone(),
            handoff_timeout_secs: 1,
            extender_repository: utf8(self.dir.path().join("extenders")),
            worker_store: utf8(self.store_path()),
            ..Config::default()
        })
    }
}

/// Lifecycle events observed by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    WorkersLoaded(LoadSummary),
    HandoffStarted(usize),
    HandoffCompleted(u32),
    HandoffAborted(String),
}

#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events.lock().expect("reporter mutex").clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events.lock().expect("reporter mutex").push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn workers_loaded(&self, summary: LoadSummary) {
        self.record(HealthEvent::WorkersLoaded(summary));
    }

    fn handoff_started(&self, listeners: usize) {
        self.record(HealthEvent::HandoffStarted(listeners));
    }

    fn handoff_completed(&self, successor: u32) {
        self.record(HealthEvent::HandoffCompleted(successor));
    }

    fn handoff_aborted(&self, error: &HandoffError) {
        self.record(HealthEvent::HandoffAborted(error.to_string()));
    }
}

#[derive(Clone, Default)]
pub(crate) struct TestDaemonizer {
    calls: Arc<AtomicUsize>,
}

impl TestDaemonizer {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Daemonizer for TestDaemonizer {
    fn daemonize(&self, _paths: &RuntimePaths) -> Result<(), DaemonizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Signal source fed by the test.
#[derive(Clone, Default)]
pub(crate) struct TestSignals {
    inner: Arc<(Mutex<VecDeque<ControlSignal>>, Condvar)>,
}

impl TestSignals {
    pub(crate) fn send(&self, signal: ControlSignal) {
        let (queue, ready) = &*self.inner;
        queue.lock().expect("signal mutex").push_back(signal);
        ready.notify_all();
    }
}

impl SignalSource for TestSignals {
    fn wait(&self) -> Result<ControlSignal, SignalError> {
        let (queue, ready) = &*self.inner;
        let mut pending = queue.lock().expect("signal mutex");
        loop {
            if let Some(signal) = pending.pop_front() {
                return Ok(signal);
            }
            pending = ready.wait(pending).expect("signal mutex");
        }
    }
}

/// Successor launcher with a fixed answer.
#[derive(Clone)]
pub(crate) struct ScriptedLauncher {
    acknowledge: bool,
    clobber: Option<(PathBuf, u32)>,
    launches: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedLauncher {
    pub(crate) fn new(acknowledge: bool) -> Self {
        Self {
            acknowledge,
            clobber: None,
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails after recording `pid` in `pid_path`, as a successor killed
    /// late in its startup would.
    pub(crate) fn clobbering(pid_path: PathBuf, pid: u32) -> Self {
        Self {
            clobber: Some((pid_path, pid)),
            ..Self::new(false)
        }
    }

    /// Descriptor counts of every launch attempt.
    pub(crate) fn launches(&self) -> Vec<usize> {
        self.launches.lock().expect("launcher mutex").clone()
    }
}

impl SuccessorLauncher for ScriptedLauncher {
    fn launch(&self, outgoing: &Outgoing, timeout: Duration) -> Result<u32, HandoffError> {
        self.launches
            .lock()
            .expect("launcher mutex")
            .push(outgoing.fds.len());
        if let Some((path, pid)) = &self.clobber {
            std::fs::write(path, format!("{pid}\n")).expect("clobber pid file");
        }
        if self.acknowledge {
            Ok(4242)
        } else {
            Err(HandoffError::Timeout { timeout })
        }
    }
}

/// Predecessor that hands over a prepared descriptor set.
pub(crate) struct TestPredecessor {
    traffic: Option<TrafficSet>,
    acknowledged: Arc<AtomicBool>,
    reachable: bool,
}

impl TestPredecessor {
    pub(crate) fn new(traffic: TrafficSet) -> (Self, Arc<AtomicBool>) {
        let acknowledged = Arc::new(AtomicBool::new(false));
        (
            Self {
                traffic: Some(traffic),
                acknowledged: Arc::clone(&acknowledged),
                reachable: true,
            },
            acknowledged,
        )
    }

    /// Predecessor whose acknowledgement pipe is already closed.
    pub(crate) fn unreachable(traffic: TrafficSet) -> Self {
        let (predecessor, _) = Self::new(traffic);
        Self {
            reachable: false,
            ..predecessor
        }
    }
}

impl Predecessor for TestPredecessor {
    fn traffic(&mut self) -> Result<TrafficSet, TrafficError> {
        Ok(self.traffic.take().unwrap_or_default())
    }

    fn acknowledge(&mut self) -> io::Result<()> {
        if !self.reachable {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "predecessor closed the acknowledgement pipe",
            ));
        }
        self.acknowledged.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Sends one admin request and returns the parsed response line.
pub(crate) fn admin_request(socket: &Path, request: &str) -> Result<Value, String> {
    let mut stream = UnixStream::connect(socket).map_err(|error| error.to_string())?;
    stream
        .write_all(request.as_bytes())
        .and_then(|()| stream.write_all(b"\n"))
        .and_then(|()| stream.shutdown(Shutdown::Write))
        .map_err(|error| error.to_string())?;
    let mut line = String::new();
    BufReader::new(stream)
        .read_line(&mut line)
        .map_err(|error| error.to_string())?;
    serde_json::from_str(&line).map_err(|error| format!("bad response {line:?}: {error}"))
}
