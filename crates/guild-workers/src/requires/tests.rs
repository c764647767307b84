//! Unit tests for dependency tracking.

use rstest::{fixture, rstest};

use super::*;

fn worker(text: &str) -> WorkerId {
    text.parse().expect("valid worker id")
}

fn requires(ids: &[&str]) -> Vec<RequireId> {
    ids.iter().map(|id| RequireId::new(*id)).collect()
}

#[fixture]
fn manager() -> RequireManager {
    let mut manager = RequireManager::new();
    manager.set(&worker("a@router"), requires(&["pool@upstream"]));
    manager.set(&worker("b@router"), requires(&["pool@upstream", "auth@plugin"]));
    manager
}

#[rstest]
fn counts_incoming_edges(manager: RequireManager) {
    assert_eq!(manager.require_by_count("pool@upstream"), 2);
    assert_eq!(manager.require_by_count("auth@plugin"), 1);
    assert_eq!(manager.require_by_count("a@router"), 0);
}

#[rstest]
fn set_replaces_previous_edges(mut manager: RequireManager) {
    manager.set(&worker("b@router"), requires(&["auth@plugin", "cache@plugin"]));
    assert_eq!(manager.require_by_count("pool@upstream"), 1);
    assert_eq!(manager.require_by_count("auth@plugin"), 1);
    assert_eq!(manager.require_by_count("cache@plugin"), 1);
}

#[rstest]
fn duplicate_references_count_once(mut manager: RequireManager) {
    manager.set(&worker("c@router"), requires(&["pool@upstream", "pool@upstream"]));
    assert_eq!(manager.require_by_count("pool@upstream"), 3);
}

#[rstest]
fn del_releases_targets(mut manager: RequireManager) {
    manager.del(&worker("a@router"));
    manager.del(&worker("b@router"));
    assert_eq!(manager.require_by_count("pool@upstream"), 0);
    assert_eq!(manager.require_by_count("auth@plugin"), 0);
    assert!(manager.requires_of(&worker("a@router")).is_none());
}

#[rstest]
fn del_of_unknown_worker_is_noop(mut manager: RequireManager) {
    manager.del(&worker("ghost@router"));
    assert_eq!(manager.require_by_count("pool@upstream"), 2);
}

#[rstest]
fn lists_dependents(manager: RequireManager) {
    assert_eq!(
        manager.dependents_of("pool@upstream"),
        [worker("a@router"), worker("b@router")]
    );
}

#[test]
fn counts_match_live_edges_after_mixed_operations() {
    let mut manager = RequireManager::new();
    let script: [(&str, Option<&[&str]>); 6] = [
        ("a@r", Some(&["x@u", "y@u"][..])),
        ("b@r", Some(&["x@u"][..])),
        ("a@r", Some(&["y@u"][..])),
        ("c@r", Some(&["x@u", "y@u"][..])),
        ("b@r", None),
        ("c@r", Some(&[][..])),
    ];
    for (id, edges) in script {
        match edges {
            Some(edges) => manager.set(&worker(id), requires(edges)),
            None => manager.del(&worker(id)),
        }
    }
    for target in ["x@u", "y@u"] {
        let expected = ["a@r", "b@r", "c@r"]
            .iter()
            .filter(|owner| {
                manager
                    .requires_of(&worker(owner))
                    .is_some_and(|edges| edges.contains(&RequireId::new(target)))
            })
            .count();
        assert_eq!(manager.require_by_count(target), expected, "target {target}");
    }
    assert_eq!(manager.require_by_count("x@u"), 0);
    assert_eq!(manager.require_by_count("y@u"), 1);
}
