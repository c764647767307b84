//! Unit tests for the worker store.

use std::path::Path;

use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn store() -> WorkerStore {
    WorkerStore {
        variables: BTreeMap::from([("port".to_owned(), "8080".to_owned())]),
        workers: vec![WorkerRecord {
            id: "pool@upstream".to_owned(),
            profession: "upstream".to_owned(),
            name: "pool".to_owned(),
            driver: "static".to_owned(),
            description: "primary pool".to_owned(),
            body: r#"{"nodes":["10.0.0.1:${port}"]}"#.to_owned(),
            create_time: "2024-05-01T10:00:00Z".to_owned(),
            update_time: "2024-05-02T10:00:00Z".to_owned(),
        }],
    }
}

#[rstest]
fn saves_and_loads(store: WorkerStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("state").join("workers.json");
    store.save(&path).expect("save");
    let loaded = WorkerStore::load(&path).expect("load");
    assert_eq!(loaded, store);
}

#[test]
fn missing_file_is_empty_store() {
    let dir = tempfile::tempdir().expect("temp dir");
    let loaded = WorkerStore::load(&dir.path().join("absent.json")).expect("load");
    assert_eq!(loaded, WorkerStore::default());
}

#[rstest]
#[case::empty(b"".as_slice())]
#[case::whitespace(b" \n".as_slice())]
fn blank_documents_are_empty(#[case] bytes: &[u8]) {
    let store = WorkerStore::from_slice(bytes, Path::new("inline")).expect("decode");
    assert!(store.workers.is_empty());
}

#[test]
fn malformed_document_is_reported() {
    let error = WorkerStore::from_slice(b"{\"workers\": 3}", Path::new("inline"))
        .expect_err("malformed store");
    assert!(matches!(error, WorkerError::StoreFormat { .. }));
}

#[test]
fn timestamps_round_trip_through_rfc3339() {
    let parsed = parse_time("2024-05-01T10:00:00Z").expect("parse");
    assert_eq!(format_time(parsed), "2024-05-01T10:00:00Z");
    assert!(parse_time("yesterday").is_none());
}
