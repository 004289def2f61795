// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn minimal_entry_json() -> serde_json::Value {
    serde_json::json!({
        "id": "whoami",
        "version": "1.0.0",
        "compose_template": "services:\n  whoami:\n    image: traefik/whoami\n",
    })
}

#[test]
fn entry_defaults_are_optional() {
    let entry: CatalogEntry = serde_json::from_value(minimal_entry_json()).unwrap();
    assert_eq!(entry.id, "whoami");
    assert!(!entry.needs_privileged);
    assert!(entry.schema.is_none());
    assert!(entry.health.is_none());
    assert!(entry.defaults.env.is_empty());
}

#[test]
fn health_spec_fills_interval_defaults() {
    let spec: HealthSpec = serde_json::from_value(serde_json::json!({
        "kind": "http",
        "path": "/",
    }))
    .unwrap();
    assert_eq!(spec.interval_secs, 2);
    assert_eq!(spec.healthy_after, 2);
    assert_eq!(spec.timeout_secs, 60);
}

#[test]
fn document_round_trips() {
    let doc = CatalogDocument {
        version: CATALOG_DOC_VERSION,
        entries: vec![serde_json::from_value(minimal_entry_json()).unwrap()],
    };
    let json = serde_json::to_string(&doc).unwrap();
    let back: CatalogDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(back, doc);
}
