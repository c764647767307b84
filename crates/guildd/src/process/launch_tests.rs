//! Unit tests for listener adoption, the acknowledgement channel, and the
//! handoff itself.

use std::fs;
use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::os::fd::IntoRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use guild_workers::WorkerSpec;
use serde_json::json;

use super::*;
use crate::StructuredHealthReporter;
use crate::drivers::{Gateway, builtin_professions};
use crate::handoff::{HandoffError, MockSuccessorLauncher};

fn loopback() -> (TcpListener, SocketEndpoint) {
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let port = listener.local_addr().expect("addr").port();
    (listener, SocketEndpoint::tcp("127.0.0.1", port))
}

fn inherited(listener: TcpListener, endpoint: &SocketEndpoint) -> Traffic {
    let fd = listener.into_raw_fd();
    Traffic::new(u64::try_from(fd).expect("non-negative fd"), endpoint)
}

#[test]
fn matching_descriptors_are_adopted() {
    let (listener, endpoint) = loopback();
    let traffic = inherited(listener, &endpoint);

    let listeners = open_listeners(std::slice::from_ref(&endpoint), &[traffic]).expect("open");

    let [adopted] = listeners.as_slice() else {
        panic!("expected one listener");
    };
    assert_eq!(adopted.endpoint(), &endpoint);
    let SocketEndpoint::Tcp { port, .. } = &endpoint else {
        panic!("expected tcp endpoint");
    };
    TcpStream::connect(("127.0.0.1", *port)).expect("adopted socket accepts connections");
}

#[test]
fn missing_endpoints_are_bound() {
    let endpoint = SocketEndpoint::tcp("127.0.0.1", 0);
    let listeners = open_listeners(std::slice::from_ref(&endpoint), &[]).expect("open");
    assert_eq!(listeners.len(), 1);
    assert!(listeners.first().and_then(SocketListener::local_addr).is_some());
}

#[test]
fn unclaimed_descriptors_are_closed() {
    let (listener, endpoint) = loopback();
    let SocketEndpoint::Tcp { port, .. } = endpoint.clone() else {
        panic!("expected tcp endpoint");
    };
    let traffic = inherited(listener, &endpoint);

    let listeners = open_listeners(&[], &[traffic]).expect("open");

    assert!(listeners.is_empty());
    assert!(TcpStream::connect(("127.0.0.1", port)).is_err());
}

#[test]
fn detached_ack_channel_carries_only_the_ready_line() {
    let (mut reader, mut writer) = io::pipe().expect("pipe");
    let diverted = tempfile::NamedTempFile::new().expect("fallback file");

    let ack = AckChannel::detach(writer.as_fd(), diverted.as_file().as_fd()).expect("detach");
    writer.write_all(b"GET /x 404\n").expect("access line");
    writer.flush().expect("flush");
    ack.acknowledge().expect("acknowledge");
    drop(writer);

    let mut received = String::new();
    reader.read_to_string(&mut received).expect("read pipe");
    assert_eq!(received, READY_LINE);
    assert_eq!(
        fs::read_to_string(diverted.path()).expect("fallback contents"),
        "GET /x 404\n"
    );
}

fn registry() -> Workers {
    let gateway = Arc::new(Gateway::new());
    let workers = Workers::new(Arc::new(builtin_professions(&gateway).expect("catalog")));
    workers
        .set(&WorkerSpec::new(
            "upstream",
            "pool",
            "static",
            json!({ "nodes": ["10.0.0.1:80"] }).to_string(),
        ))
        .expect("seed worker");
    workers
}

fn run_handoff(gate: &MutationGate, launcher: &MockSuccessorLauncher) -> bool {
    let workers = registry();
    let config = Config::default();
    let reporter = StructuredHealthReporter::new();
    let handoff = Handoff {
        workers: &workers,
        gate,
        config: &config,
        reporter: &reporter,
    };
    handoff.run(&[], launcher).expect("handoff")
}

#[test]
fn acknowledged_handoff_retires_the_mutation_gate() {
    let gate = Arc::new(MutationGate::default());
    let frozen_during_launch = Arc::new(AtomicBool::new(false));
    let mut launcher = MockSuccessorLauncher::new();
    {
        let gate = Arc::clone(&gate);
        let frozen = Arc::clone(&frozen_during_launch);
        launcher.expect_launch().times(1).returning(move |outgoing, _| {
            frozen.store(gate.is_frozen(), Ordering::SeqCst);
            assert!(!outgoing.traffic.worker_store.is_empty());
            Ok(4242)
        });
    }

    assert!(run_handoff(&gate, &launcher));
    assert!(frozen_during_launch.load(Ordering::SeqCst));
    assert!(gate.is_retired());
}

#[test]
fn abandoned_handoff_reopens_the_mutation_gate() {
    let gate = Arc::new(MutationGate::default());
    let mut launcher = MockSuccessorLauncher::new();
    launcher
        .expect_launch()
        .times(1)
        .returning(|_, _| Err(HandoffError::Timeout {
            timeout: Duration::from_secs(1),
        }));

    assert!(!run_handoff(&gate, &launcher));
    assert!(!gate.is_frozen());
    assert!(!gate.is_retired());
}
