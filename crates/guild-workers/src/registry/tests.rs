//! Unit tests for the worker registry.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::error::ErrorKind;
use crate::tests::support::{Fixture, fixture_catalog};

struct Harness {
    fixture: Fixture,
    workers: Workers,
}

#[fixture]
fn harness() -> Harness {
    let fixture = fixture_catalog();
    let workers = Workers::new(Arc::new(fixture.professions.clone()));
    Harness { fixture, workers }
}

fn id(text: &str) -> WorkerId {
    text.parse().expect("valid worker id")
}

fn upstream(name: &str) -> WorkerSpec {
    WorkerSpec::new(
        "upstream",
        name,
        "static",
        json!({ "scheme": "http", "nodes": ["10.0.0.1:80"] }).to_string(),
    )
}

fn router(name: &str, upstream: &str) -> WorkerSpec {
    WorkerSpec::new(
        "router",
        name,
        "http",
        json!({ "host": "example.test", "upstream": upstream }).to_string(),
    )
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

#[rstest]
fn set_creates_worker(harness: Harness) {
    let info = harness
        .workers
        .set(&upstream("pool").with_description("primary"))
        .expect("set");
    assert_eq!(info.id().as_str(), "pool@upstream");
    assert_eq!(info.driver(), "static");
    assert_eq!(info.description(), "primary");
    assert_eq!(info.config_type(), "staticConfig");
    assert_eq!(info.create_time(), info.update_time());
    assert!(harness.fixture.upstream.worker("pool@upstream").is_some());
}

#[rstest]
fn second_set_resets_in_place(harness: Harness) {
    let first = harness.workers.set(&upstream("pool")).expect("first set");
    let second = harness
        .workers
        .set(&WorkerSpec::new(
            "upstream",
            "pool",
            "static",
            json!({ "nodes": ["10.0.0.2:80"] }).to_string(),
        ))
        .expect("second set");

    assert_eq!(second.create_time(), first.create_time());
    assert!(second.update_time() >= first.update_time());
    assert_eq!(harness.workers.export().get("upstream").map(Vec::len), Some(1));
    let worker = harness
        .fixture
        .upstream
        .worker("pool@upstream")
        .expect("fake worker");
    assert_eq!(worker.resets.load(Ordering::SeqCst), 1);
    assert_eq!(
        *worker.config.lock().expect("config lock"),
        json!({ "nodes": ["10.0.0.2:80"] })
    );
    assert_eq!(harness.fixture.upstream.created.lock().expect("lock").len(), 1);
}

#[rstest]
#[case::unknown_profession(WorkerSpec::new("gateway", "edge", "http", "{}"), ErrorKind::NotFound)]
#[case::unknown_driver(WorkerSpec::new("upstream", "pool", "dns", "{}"), ErrorKind::NotFound)]
#[case::invalid_name(WorkerSpec::new("upstream", "po ol", "static", "{}"), ErrorKind::Validation)]
#[case::bad_json(WorkerSpec::new("upstream", "pool", "static", "{nodes"), ErrorKind::Validation)]
#[case::driver_decode(WorkerSpec::new("upstream", "pool", "static", "[1]"), ErrorKind::Validation)]
#[case::undefined_variable(
    WorkerSpec::new("upstream", "pool", "static", r#"{"node":"${missing}"}"#),
    ErrorKind::Validation
)]
#[case::create_refused(
    WorkerSpec::new("upstream", "pool", "static", r#"{"fail_create":true}"#),
    ErrorKind::Validation
)]
#[case::missing_require(router("edge", "ghost@upstream"), ErrorKind::NotFound)]
fn failed_set_leaves_registry_empty(
    harness: Harness,
    #[case] spec: WorkerSpec,
    #[case] kind: ErrorKind,
) {
    let error = harness.workers.set(&spec).expect_err("set should fail");
    assert_eq!(error.kind(), kind, "unexpected error: {error}");
    assert!(harness.workers.export().is_empty());
    assert!(harness.workers.store().workers.is_empty());
}

#[rstest]
fn failed_reset_keeps_previous_state(harness: Harness) {
    let first = harness.workers.set(&upstream("pool")).expect("set");
    let error = harness
        .workers
        .set(&WorkerSpec::new(
            "upstream",
            "pool",
            "static",
            r#"{"fail_reset":true}"#,
        ))
        .expect_err("reset should fail");
    assert!(matches!(error, WorkerError::Driver { action: "reset", .. }));

    let current = harness.workers.get(&id("pool@upstream")).expect("still present");
    assert_eq!(current.body(), first.body());
    assert_eq!(current.update_time(), first.update_time());
}

#[rstest]
fn checker_rejection_aborts_without_mutation(harness: Harness) {
    harness.workers.set(&upstream("pool")).expect("upstream");
    let spec = WorkerSpec::new(
        "router",
        "edge",
        "http",
        json!({ "upstream": "pool@upstream", "reject": true }).to_string(),
    );
    let error = harness.workers.set(&spec).expect_err("checker should reject");
    assert!(matches!(error, WorkerError::Rejected { .. }));
    assert_eq!(harness.workers.require_by_count(&id("pool@upstream")), 0);
    assert!(harness.workers.get(&id("edge@router")).is_none());
}

#[rstest]
fn require_must_offer_schema_skill(harness: Harness) {
    harness
        .workers
        .set(&WorkerSpec::new("P", "d1", "", "{}"))
        .expect("singleton");
    let error = harness
        .workers
        .set(&router("edge", "d1@P"))
        .expect_err("skill mismatch");
    assert!(matches!(error, WorkerError::SkillMismatch { ref skill, .. } if skill == "upstream"));
}

#[rstest]
fn dependencies_are_passed_to_driver(harness: Harness) {
    harness.workers.set(&upstream("pool")).expect("upstream");
    harness
        .workers
        .set(&router("edge", "pool@upstream"))
        .expect("router");
    let worker = harness
        .fixture
        .router
        .worker("edge@router")
        .expect("router worker");
    assert_eq!(
        *worker.requires.lock().expect("requires lock"),
        ["pool@upstream"]
    );
    assert_eq!(harness.workers.require_by_count(&id("pool@upstream")), 1);
}

// ---------------------------------------------------------------------------
// singleton professions
// ---------------------------------------------------------------------------

#[rstest]
fn singleton_forces_driver_to_name(harness: Harness) {
    let info = harness
        .workers
        .set(&WorkerSpec::new("P", "d1", "ignored", "{}"))
        .expect("singleton set");
    assert_eq!(info.id().as_str(), "d1@P");
    assert_eq!(info.driver(), "d1");
    assert!(harness.fixture.singleton.worker("d1@P").is_some());
}

#[rstest]
fn singleton_rejects_second_worker(harness: Harness) {
    harness
        .workers
        .set(&WorkerSpec::new("P", "d1", "", "{}"))
        .expect("singleton set");
    let error = harness
        .workers
        .set(&WorkerSpec::new("P", "d2", "", "{}"))
        .expect_err("second singleton");
    assert_eq!(error.kind(), ErrorKind::Conflict);
    harness
        .workers
        .set(&WorkerSpec::new("P", "d1", "", r#"{"v":2}"#))
        .expect("resetting the singleton is allowed");
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

#[rstest]
fn update_infers_existing_driver(harness: Harness) {
    harness.workers.set(&upstream("pool")).expect("set");
    let info = harness
        .workers
        .update(WorkerSpec::new("upstream", "pool", "", r#"{"nodes":[]}"#))
        .expect("update");
    assert_eq!(info.driver(), "static");
    assert_eq!(info.body(), br#"{"nodes":[]}"#);
}

#[rstest]
fn update_without_driver_requires_existing_worker(harness: Harness) {
    let error = harness
        .workers
        .update(WorkerSpec::new("upstream", "pool", "", "{}"))
        .expect_err("nothing to infer from");
    assert!(matches!(error, WorkerError::WorkerNotExist { .. }));
}

// ---------------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------------

#[rstest]
fn delete_refuses_required_worker(harness: Harness) {
    harness.workers.set(&upstream("pool")).expect("upstream");
    harness
        .workers
        .set(&router("edge", "pool@upstream"))
        .expect("router");

    let error = harness
        .workers
        .delete(&id("pool@upstream"))
        .expect_err("pool is in use");
    assert_eq!(error.kind(), ErrorKind::Conflict);
    assert!(harness.workers.get(&id("pool@upstream")).is_some());

    harness.workers.delete(&id("edge@router")).expect("delete router");
    let removed = harness
        .workers
        .delete(&id("pool@upstream"))
        .expect("delete pool");
    let worker = harness
        .fixture
        .upstream
        .worker("pool@upstream")
        .expect("fake worker");
    assert!(worker.stopped.load(Ordering::SeqCst));
    assert_eq!(removed.id().as_str(), "pool@upstream");
}

#[rstest]
fn delete_unknown_worker_fails(harness: Harness) {
    let error = harness
        .workers
        .delete(&id("ghost@upstream"))
        .expect_err("unknown worker");
    assert!(matches!(error, WorkerError::WorkerNotExist { .. }));
}

#[rstest]
fn stop_failure_keeps_record(harness: Harness) {
    harness.workers.set(&upstream("pool")).expect("set");
    harness
        .fixture
        .upstream
        .worker("pool@upstream")
        .expect("fake worker")
        .fail_stop
        .store(true, Ordering::SeqCst);
    let error = harness
        .workers
        .delete(&id("pool@upstream"))
        .expect_err("stop refused");
    assert!(matches!(error, WorkerError::Driver { action: "stop", .. }));
    assert!(harness.workers.get(&id("pool@upstream")).is_some());
}

#[rstest]
fn retargeting_dependency_releases_old_target(harness: Harness) {
    harness.workers.set(&upstream("a")).expect("a");
    harness.workers.set(&upstream("b")).expect("b");
    harness.workers.set(&router("edge", "a@upstream")).expect("edge -> a");
    harness.workers.set(&router("edge", "b@upstream")).expect("edge -> b");

    assert_eq!(harness.workers.require_by_count(&id("a@upstream")), 0);
    assert_eq!(harness.workers.require_by_count(&id("b@upstream")), 1);
    harness.workers.delete(&id("a@upstream")).expect("a is free");
}

// ---------------------------------------------------------------------------
// listing, export, variables
// ---------------------------------------------------------------------------

#[rstest]
fn list_employees_adds_profession_labels(harness: Harness) {
    harness.workers.set(&upstream("pool")).expect("upstream");
    harness
        .workers
        .set(&router("edge", "pool@upstream"))
        .expect("router");
    let views = harness.workers.list_employees("router").expect("list");
    assert_eq!(views.len(), 1);
    let view = views.first().expect("view");
    assert_eq!(view.id, "edge@router");
    assert_eq!(
        view.labels.get("host").map(String::as_str),
        Some("example.test")
    );
    assert!(harness.workers.list_employees("gateway").is_err());
}

#[rstest]
fn variables_are_substituted_and_tracked(harness: Harness) {
    harness.workers.set_variable("pool", "pool@upstream");
    harness.workers.set(&upstream("pool")).expect("upstream");
    harness
        .workers
        .set(&router("edge", "${pool}"))
        .expect("router via variable");
    assert_eq!(harness.workers.require_by_count(&id("pool@upstream")), 1);
    assert_eq!(harness.workers.workers_using("pool"), [id("edge@router")]);
    assert_eq!(
        harness.workers.set_variable("pool", "other@upstream"),
        [id("edge@router")]
    );
    let stored = harness
        .workers
        .get(&id("edge@router"))
        .expect("router")
        .record();
    assert!(stored.body.contains("${pool}"), "raw body is kept: {}", stored.body);
}

#[rstest]
fn store_round_trip_preserves_workers_and_times(harness: Harness) {
    harness.workers.set_variable("pool", "pool@upstream");
    harness.workers.set(&upstream("pool")).expect("upstream");
    harness.workers.set(&router("edge", "${pool}")).expect("router");
    let mut store = harness.workers.store();
    for record in &mut store.workers {
        record.create_time = "2024-01-01T00:00:00Z".to_owned();
    }
    // Routers first: load must still materialise upstreams before them.
    store.workers.reverse();

    let restored = Workers::new(Arc::new(fixture_catalog().professions));
    let summary = restored.load(store);
    assert_eq!(summary, LoadSummary { loaded: 2, skipped: 0 });
    let edge = restored.get(&id("edge@router")).expect("router restored");
    assert_eq!(format_time(edge.create_time()), "2024-01-01T00:00:00Z");
    assert_eq!(restored.require_by_count(&id("pool@upstream")), 1);
}

#[rstest]
fn load_skips_failing_records(harness: Harness) {
    let mut store = WorkerStore::default();
    store.workers.push(router("edge", "ghost@upstream").into_record());
    store.workers.push(upstream("pool").into_record());
    let summary = harness.workers.load(store);
    assert_eq!(summary, LoadSummary { loaded: 1, skipped: 1 });
    assert!(harness.workers.get(&id("pool@upstream")).is_some());
}

#[rstest]
fn shutdown_stops_every_worker(harness: Harness) {
    harness.workers.set(&upstream("pool")).expect("upstream");
    harness
        .workers
        .set(&router("edge", "pool@upstream"))
        .expect("router");
    assert_eq!(harness.workers.shutdown(), 2);
    assert!(harness.workers.export().is_empty());
    assert_eq!(harness.workers.require_by_count(&id("pool@upstream")), 0);
}

#[rstest]
fn concurrent_mutations_keep_counts_consistent(harness: Harness) {
    harness.workers.set(&upstream("pool")).expect("upstream");
    harness
        .workers
        .set(&router("anchor", "pool@upstream"))
        .expect("anchor router");
    let workers = Arc::new(harness.workers);
    let handles: Vec<_> = (0..8)
        .map(|index| {
            let workers = Arc::clone(&workers);
            thread::spawn(move || {
                let name = format!("edge{index}");
                for _ in 0..20 {
                    workers
                        .set(&router(&name, "pool@upstream"))
                        .expect("router set");
                    assert!(workers.delete(&id("pool@upstream")).is_err());
                    if index % 2 == 0 {
                        workers
                            .delete(&id(&format!("{name}@router")))
                            .expect("router delete");
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread");
    }

    let live_routers = workers.list_employees("router").expect("list").len();
    assert_eq!(live_routers, 5);
    assert_eq!(workers.require_by_count(&id("pool@upstream")), live_routers);
    assert!(workers.get(&id("pool@upstream")).is_some());
}

trait IntoRecord {
    fn into_record(self) -> WorkerRecord;
}

impl IntoRecord for WorkerSpec {
    fn into_record(self) -> WorkerRecord {
        WorkerRecord {
            id: format!("{}@{}", self.name, self.profession),
            profession: self.profession,
            name: self.name,
            driver: self.driver,
            description: self.description,
            body: String::from_utf8(self.body).expect("utf8 body"),
            create_time: String::new(),
            update_time: String::new(),
        }
    }
}
