//! Unit tests for successor launch and acknowledgement.

use std::net::TcpListener;
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use guild_config::SocketEndpoint;

use super::*;
use crate::traffic::read_traffic;
use crate::transport::{ConnectionHandler, CountingHandler, SocketListener};

const TIMEOUT: Duration = Duration::from_secs(5);

fn shell(script: &str) -> ProcessSuccessor {
    ProcessSuccessor::new("/bin/sh").with_args(["-c", script])
}

#[fixture]
fn outgoing() -> Outgoing {
    Outgoing {
        fds: Vec::new(),
        traffic: TrafficSet {
            traffic: Vec::new(),
            worker_store: br#"{"variables":{},"workers":[]}"#.to_vec(),
        },
    }
}

#[rstest]
fn acknowledged_successor_reports_its_pid(outgoing: Outgoing) {
    let launcher = shell("cat >/dev/null; printf 'ready\\n'");
    let pid = launcher.launch(&outgoing, TIMEOUT).expect("handoff");
    assert_ne!(pid, std::process::id());
}

#[rstest]
fn successor_receives_the_descriptor_set(outgoing: Outgoing) {
    let dir = TempDir::new().expect("temp dir");
    let capture = dir.path().join("stdin.bin");
    let launcher = ProcessSuccessor::new("/bin/sh").with_args([
        "-c".into(),
        "cat > \"$0\"; printf 'ready\\n'".into(),
        capture.clone().into_os_string(),
    ]);
    launcher.launch(&outgoing, TIMEOUT).expect("handoff");

    let bytes = std::fs::read(&capture).expect("captured stdin");
    let received = read_traffic(bytes.as_slice()).expect("decode");
    assert_eq!(received, outgoing.traffic);
}

#[cfg(target_os = "linux")]
#[test]
fn listeners_are_placed_from_fd_three() {
    let first = TcpListener::bind(("127.0.0.1", 0)).expect("bind first");
    let second = TcpListener::bind(("127.0.0.1", 0)).expect("bind second");
    let outgoing = Outgoing {
        fds: vec![second.as_raw_fd(), first.as_raw_fd()],
        traffic: TrafficSet::default(),
    };
    let launcher =
        shell("cat >/dev/null; [ -S /proc/$$/fd/3 ] && [ -S /proc/$$/fd/4 ] && printf 'ready\\n'");
    launcher.launch(&outgoing, TIMEOUT).expect("descriptors placed");
}

#[rstest]
fn exit_without_acknowledgement_aborts(outgoing: Outgoing) {
    let error = shell("cat >/dev/null; exit 3")
        .launch(&outgoing, TIMEOUT)
        .expect_err("no ack");
    match error {
        HandoffError::Exited { status } => assert_eq!(status.code(), Some(3)),
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
fn unexpected_output_aborts(outgoing: Outgoing) {
    let error = shell("cat >/dev/null; printf 'booting\\n'; sleep 5")
        .launch(&outgoing, TIMEOUT)
        .expect_err("wrong ack");
    assert!(matches!(error, HandoffError::Unexpected { line } if line == "booting\n"));
}

#[rstest]
fn silent_successor_times_out(outgoing: Outgoing) {
    let started = Instant::now();
    let error = shell("cat >/dev/null; sleep 30")
        .launch(&outgoing, Duration::from_millis(200))
        .expect_err("timeout");
    assert!(matches!(error, HandoffError::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[rstest]
fn successor_closing_stdout_without_exiting_times_out(outgoing: Outgoing) {
    let started = Instant::now();
    let error = shell("cat >/dev/null; exec >&-; sleep 30")
        .launch(&outgoing, Duration::from_millis(300))
        .expect_err("no ack");
    assert!(matches!(error, HandoffError::Timeout { .. }), "{error}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[rstest]
fn successor_ignoring_stdin_times_out() {
    let outgoing = Outgoing {
        fds: Vec::new(),
        traffic: TrafficSet {
            traffic: Vec::new(),
            worker_store: vec![b' '; 1 << 20],
        },
    };
    let started = Instant::now();
    let error = shell("sleep 30")
        .launch(&outgoing, Duration::from_millis(300))
        .expect_err("no ack");
    assert!(matches!(error, HandoffError::Timeout { .. }), "{error}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[rstest]
fn missing_program_fails_to_spawn(outgoing: Outgoing) {
    let error = ProcessSuccessor::new("/nonexistent/guildd")
        .launch(&outgoing, TIMEOUT)
        .expect_err("spawn");
    assert!(matches!(error, HandoffError::Spawn { .. }));
}

#[test]
fn running_listeners_are_described_in_order() {
    let admin = SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind admin");
    let service =
        SocketListener::bind(&SocketEndpoint::tcp("127.0.0.1", 0)).expect("bind service");
    let (_, handler) = CountingHandler::new();
    let handler: Arc<dyn ConnectionHandler> = handler;
    let handles = vec![
        admin.start(Arc::clone(&handler)).expect("start admin"),
        service.start(handler).expect("start service"),
    ];

    let outgoing = Outgoing::describe(&handles, b"{}".to_vec()).expect("describe");
    let fds: Vec<u64> = outgoing.traffic.traffic.iter().map(|t| t.fd).collect();
    assert_eq!(fds, [3, 4]);
    let raw: Vec<RawFd> = handles.iter().map(ListenerHandle::raw_fd).collect();
    assert_eq!(outgoing.fds, raw);
    assert!(outgoing.traffic.traffic.iter().all(|t| t.network == "tcp"));
    assert_eq!(outgoing.traffic.worker_store, b"{}");

    for handle in handles {
        handle.shutdown();
        handle.join().expect("join");
    }
}
