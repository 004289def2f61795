// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    validation = { ErrorKind::Validation, "validation" },
    precondition = { ErrorKind::Precondition, "precondition" },
    external = { ErrorKind::External, "external" },
    timeout = { ErrorKind::Timeout, "timeout" },
    integrity = { ErrorKind::Integrity, "integrity" },
    fatal = { ErrorKind::Fatal, "fatal" },
)]
fn kind_code_prefix(kind: ErrorKind, expected: &str) {
    assert_eq!(kind.as_str(), expected);
}

#[test]
fn body_code_combines_kind_and_slug() {
    let body = ErrorBody::new(ErrorKind::Precondition, "already_installed", "app exists");
    assert_eq!(body.code, "precondition.already_installed");
    assert_eq!(body.kind(), ErrorKind::Precondition);
}

#[test]
fn details_omitted_when_empty() {
    let body = ErrorBody::new(ErrorKind::Validation, "params", "bad params");
    let json = serde_json::to_value(&body).unwrap();
    assert!(json.get("details").is_none());
}

#[test]
fn with_field_and_hint_populate_details() {
    let body = ErrorBody::new(ErrorKind::Validation, "params", "bad params")
        .with_field("PORT")
        .with_hint("must be 1-65535");
    let details = body.details.unwrap();
    assert_eq!(details.field.as_deref(), Some("PORT"));
    assert_eq!(details.hint.as_deref(), Some("must be 1-65535"));
}

#[test]
fn stderr_is_truncated() {
    let long = "x".repeat(10 * 1024);
    let body = ErrorBody::new(ErrorKind::External, "agent", "boom").with_stderr(long);
    let stderr = body.details.unwrap().stderr.unwrap();
    assert!(stderr.len() < 9 * 1024);
    assert!(stderr.ends_with("[truncated]"));
}

#[test]
fn unknown_code_prefix_maps_to_external() {
    let body = ErrorBody {
        code: "mystery.thing".into(),
        message: "?".into(),
        details: None,
    };
    assert_eq!(body.kind(), ErrorKind::External);
}
