//! Unit tests for traffic descriptor intake.

use rstest::rstest;

use super::*;

#[test]
fn empty_stdin_inherits_nothing() {
    let set = read_traffic(io::empty()).expect("empty is valid");
    assert!(set.traffic.is_empty());
    assert!(set.worker_store.is_empty());
}

#[test]
fn descriptors_keep_order_and_store() {
    let set = TrafficSet {
        traffic: vec![
            Traffic::new(3, &SocketEndpoint::unix("/run/guild/guildd.sock")),
            Traffic::new(4, &SocketEndpoint::tcp("127.0.0.1", 8099)),
        ],
        worker_store: br#"{"workers":[]}"#.to_vec(),
    };
    let decoded = read_traffic(encode_traffic(&set).as_slice()).expect("decode");
    assert_eq!(decoded, set);
    let endpoints: Vec<String> = decoded
        .traffic
        .iter()
        .map(|traffic| traffic.endpoint().expect("endpoint").to_string())
        .collect();
    assert_eq!(
        endpoints,
        ["unix:///run/guild/guildd.sock", "tcp://127.0.0.1:8099"]
    );
}

#[test]
fn truncated_stream_is_rejected() {
    let set = TrafficSet {
        traffic: vec![Traffic::new(3, &SocketEndpoint::tcp("127.0.0.1", 8099))],
        worker_store: Vec::new(),
    };
    let framed = encode_traffic(&set);
    let truncated = framed.get(..framed.len() - 2).expect("slice");
    assert!(matches!(
        read_traffic(truncated),
        Err(TrafficError::Decode { .. })
    ));
}

#[rstest]
#[case::unknown_network("udp", "127.0.0.1:53")]
#[case::missing_port("tcp", "127.0.0.1")]
#[case::empty_path("unix", "")]
fn unusable_endpoints_are_reported(#[case] network: &str, #[case] addr: &str) {
    let traffic = Traffic {
        fd: 3,
        addr: addr.to_owned(),
        network: network.to_owned(),
    };
    assert!(matches!(
        traffic.endpoint(),
        Err(TrafficError::Endpoint { fd: 3, .. })
    ));
}

#[test]
fn oversized_descriptor_is_rejected() {
    let traffic = Traffic {
        fd: u64::MAX,
        addr: String::from("127.0.0.1:1"),
        network: String::from("tcp"),
    };
    assert!(matches!(
        traffic.raw_fd(),
        Err(TrafficError::DescriptorRange { .. })
    ));
}
