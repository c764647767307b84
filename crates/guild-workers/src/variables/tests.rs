//! Unit tests for variable substitution.

use std::collections::BTreeMap;

use rstest::{fixture, rstest};

use super::*;

#[fixture]
fn variables() -> Variables {
    Variables::with_values(BTreeMap::from([
        ("host".to_owned(), "api.internal".to_owned()),
        ("port".to_owned(), "8080".to_owned()),
        ("quote".to_owned(), "say \"hi\"\n".to_owned()),
    ]))
}

fn text(substitution: &Substitution) -> &str {
    std::str::from_utf8(&substitution.body).expect("utf8 body")
}

#[rstest]
fn replaces_references_and_records_usage(variables: Variables) {
    let result = variables
        .substitute(br#"{"addr":"${host}:${port}","again":"${host}"}"#)
        .expect("substitute");
    assert_eq!(text(&result), r#"{"addr":"api.internal:8080","again":"api.internal"}"#);
    assert_eq!(
        result.used.iter().map(String::as_str).collect::<Vec<_>>(),
        ["host", "port"]
    );
}

#[rstest]
fn escapes_values_as_json_string_content(variables: Variables) {
    let result = variables
        .substitute(br#"{"greeting":"${quote}"}"#)
        .expect("substitute");
    let parsed: serde_json::Value = serde_json::from_slice(&result.body).expect("valid json");
    assert_eq!(parsed["greeting"], "say \"hi\"\n");
}

#[rstest]
fn undefined_variable_fails(variables: Variables) {
    let error = variables
        .substitute(br#"{"addr":"${missing}"}"#)
        .expect_err("undefined variable");
    assert!(matches!(error, WorkerError::UndefinedVariable { ref name } if name == "missing"));
}

#[rstest]
#[case::plain(br#"{"addr":"api.internal:8080"}"#.as_slice())]
#[case::dollar_without_brace(br#"{"price":"$5"}"#.as_slice())]
#[case::not_utf8(b"\xff\xfe".as_slice())]
fn bodies_without_references_are_untouched(variables: Variables, #[case] body: &[u8]) {
    let result = variables.substitute(body).expect("substitute");
    assert_eq!(result.body, body);
    assert!(result.used.is_empty());
}

#[rstest]
fn substitution_is_idempotent_on_resolved_bodies(variables: Variables) {
    let first = variables
        .substitute(br#"{"addr":"${host}"}"#)
        .expect("substitute");
    let second = variables.substitute(&first.body).expect("substitute again");
    assert_eq!(second.body, first.body);
    assert!(second.used.is_empty());
}

#[rstest]
#[case::unterminated(r#"{"a":"${host"}"#)]
#[case::empty_name(r#"{"a":"${}"}"#)]
#[case::spaced_name(r#"{"a":"${ host }"}"#)]
fn malformed_references_are_kept_literally(variables: Variables, #[case] body: &str) {
    let result = variables.substitute(body.as_bytes()).expect("substitute");
    assert_eq!(text(&result), body);
    assert!(result.used.is_empty());
}

#[rstest]
fn tracks_usage_per_worker(mut variables: Variables) {
    let edge = WorkerId::new("edge", "router").expect("id");
    let pool = WorkerId::new("pool", "upstream").expect("id");
    variables.set_variables_by_id(&edge, BTreeSet::from(["host".to_owned()]));
    variables.set_variables_by_id(&pool, BTreeSet::from(["host".to_owned(), "port".to_owned()]));

    assert_eq!(variables.workers_using("host"), [edge.clone(), pool.clone()]);
    assert_eq!(variables.workers_using("port"), [pool.clone()]);

    variables.set_variables_by_id(&pool, BTreeSet::new());
    assert_eq!(variables.workers_using("port"), Vec::<WorkerId>::new());

    variables.remove_worker(&edge);
    assert!(variables.used_by(&edge).is_none());
}
