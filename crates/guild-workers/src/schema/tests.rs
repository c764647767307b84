//! Unit tests for schema-driven dependency discovery.

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;

#[fixture]
fn router_schema() -> ConfigSchema {
    ConfigSchema::new(json!({
        "title": "HttpRouterConfig",
        "type": "object",
        "properties": {
            "path": { "type": "string" },
            "upstream": { "type": "string", "eo:type": "require", "skill": "upstream" },
            "plugins": {
                "type": "array",
                "items": { "type": "string", "eo:type": "require", "eo:optional": true }
            },
            "fallback": { "type": "string", "eo:type": "require", "eo:optional": true }
        }
    }))
}

#[rstest]
fn collects_top_level_require(router_schema: ConfigSchema) {
    let found = router_schema
        .collect_requires(&json!({ "path": "/", "upstream": "pool@upstream" }))
        .expect("discovery");
    assert_eq!(
        found,
        vec![RequireRef {
            id: RequireId::new("pool@upstream"),
            skill: Some("upstream".to_owned()),
            path: "/upstream".to_owned(),
        }]
    );
}

#[rstest]
fn collects_array_elements(router_schema: ConfigSchema) {
    let found = router_schema
        .collect_requires(&json!({
            "upstream": "pool@upstream",
            "plugins": ["auth@plugin", "gzip@plugin"]
        }))
        .expect("discovery");
    let paths: Vec<&str> = found.iter().map(|found| found.path.as_str()).collect();
    assert_eq!(paths, ["/plugins/0", "/plugins/1", "/upstream"]);
}

#[rstest]
fn missing_mandatory_require_is_rejected(router_schema: ConfigSchema) {
    let error = router_schema
        .collect_requires(&json!({ "path": "/" }))
        .expect_err("missing upstream should fail");
    assert!(
        matches!(error, WorkerError::InvalidRequire { ref path, .. } if path == "/upstream"),
        "unexpected error: {error}"
    );
}

#[rstest]
#[case::number(json!({ "upstream": 7 }))]
#[case::empty(json!({ "upstream": "" }))]
fn malformed_require_is_rejected(router_schema: ConfigSchema, #[case] body: serde_json::Value) {
    assert!(router_schema.collect_requires(&body).is_err());
}

#[rstest]
fn optional_require_may_be_absent(router_schema: ConfigSchema) {
    let found = router_schema
        .collect_requires(&json!({ "upstream": "pool@upstream", "fallback": null }))
        .expect("discovery");
    assert_eq!(found.len(), 1);
}

#[test]
fn nested_objects_are_walked() {
    let schema = ConfigSchema::new(json!({
        "type": "object",
        "properties": {
            "backend": {
                "type": "object",
                "properties": {
                    "pool": { "type": "string", "eo:type": "require" }
                }
            }
        }
    }));
    let found = schema
        .collect_requires(&json!({ "backend": { "pool": "main@upstream" } }))
        .expect("discovery");
    assert_eq!(found.first().map(|found| found.path.as_str()), Some("/backend/pool"));
}

#[rstest]
fn title_names_config_type(router_schema: ConfigSchema) {
    assert_eq!(router_schema.title(), Some("HttpRouterConfig"));
}
