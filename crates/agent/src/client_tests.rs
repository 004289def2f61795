// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::fake::{FakeAgent, FakeReply};
use super::*;

#[test]
fn denied_response_maps_to_denied_error() {
    let response = VerbResponse::err(RequestId::new("r1"), "verb.denied", "nope");
    let err = response_to_output("shell.exec", response).unwrap_err();
    assert!(matches!(err, AgentError::Denied { verb } if verb == "shell.exec"));
}

#[test]
fn auth_response_maps_to_auth_error() {
    let response = VerbResponse::err(RequestId::new("r1"), "auth.denied", "bad token");
    let err = response_to_output("pkg.refresh", response).unwrap_err();
    assert!(matches!(err, AgentError::Auth { code } if code == "auth.denied"));
}

#[test]
fn failed_response_carries_stderr_and_exit_code() {
    let mut response = VerbResponse::err(RequestId::new("r1"), "verb.failed", "exit 1");
    response.stderr = Some("compose error".into());
    response.exit_code = Some(1);

    match response_to_output("container.compose.up", response).unwrap_err() {
        AgentError::Failed {
            stderr, exit_code, ..
        } => {
            assert_eq!(stderr, "compose error");
            assert_eq!(exit_code, Some(1));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn ok_response_maps_to_output() {
    let mut response = VerbResponse::ok(RequestId::new("r1"));
    response.result = Some(serde_json::json!({"cow": true}));
    response.stdout = Some("btrfs\n".into());
    response.exit_code = Some(0);

    let output = response_to_output("fs.is_cow", response).unwrap();
    assert_eq!(output.result["cow"], true);
    assert_eq!(output.stdout, "btrfs\n");
}

#[test]
fn transient_classification() {
    assert!(AgentError::Protocol(ProtocolError::ConnectionClosed).is_transient());
    assert!(AgentError::Protocol(ProtocolError::Timeout).is_transient());
    assert!(!AgentError::Denied { verb: "x".into() }.is_transient());
    assert!(!AgentError::Failed {
        verb: "x".into(),
        message: "m".into(),
        stderr: String::new(),
        exit_code: Some(1),
    }
    .is_transient());
}

#[tokio::test]
async fn fake_agent_records_calls_and_replays_scripts() {
    let agent = FakeAgent::new();
    agent.script("pkg.upgrade", FakeReply::failed("held packages"));

    let err = agent
        .call("pkg.upgrade", serde_json::json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::Failed { .. }));

    // Unscripted verbs default to success
    agent.call("pkg.refresh", serde_json::json!({})).await.unwrap();

    assert_eq!(agent.call_count("pkg.upgrade"), 1);
    assert_eq!(agent.call_count("pkg.refresh"), 1);
}

#[tokio::test]
async fn fake_agent_default_reply_persists() {
    let agent = FakeAgent::new();
    agent.default_reply(
        "fs.is_cow",
        FakeReply::ok_with_result(serde_json::json!({"cow": false})),
    );

    for _ in 0..3 {
        let out = agent.call("fs.is_cow", serde_json::json!({})).await.unwrap();
        assert_eq!(out.result["cow"], false);
    }
}
