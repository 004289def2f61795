// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nos_core::ErrorKind;

async fn installed(h: &Harness) {
    h.manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn stop_then_start_cycles_the_state_machine() {
    let h = harness();
    installed(&h).await;

    let app = h.manager.stop("whoami").await.unwrap();
    assert_eq!(app.status, AppStatus::Stopped);
    assert!(h.events.types().contains(&"app.stopped"));

    let app = h.manager.start("whoami").await.unwrap();
    assert_eq!(app.status, AppStatus::Running);
    assert!(h.events.types().contains(&"app.started"));
}

#[tokio::test]
async fn start_of_running_app_is_idempotent() {
    let h = harness();
    installed(&h).await;
    let ups = h.agent.call_count("container.compose.up");

    let app = h.manager.start("whoami").await.unwrap();
    assert_eq!(app.status, AppStatus::Running);
    assert_eq!(h.agent.call_count("container.compose.up"), ups);
}

#[tokio::test]
async fn stop_of_stopped_app_is_idempotent() {
    let h = harness();
    installed(&h).await;
    h.manager.stop("whoami").await.unwrap();
    let downs = h.agent.call_count("container.compose.down");

    let app = h.manager.stop("whoami").await.unwrap();
    assert_eq!(app.status, AppStatus::Stopped);
    assert_eq!(h.agent.call_count("container.compose.down"), downs);
}

#[tokio::test]
async fn restart_runs_down_then_up() {
    let h = harness();
    installed(&h).await;
    let ups = h.agent.call_count("container.compose.up");
    let downs = h.agent.call_count("container.compose.down");

    let app = h.manager.restart("whoami").await.unwrap();
    assert_eq!(app.status, AppStatus::Running);
    assert_eq!(h.agent.call_count("container.compose.down"), downs + 1);
    assert_eq!(h.agent.call_count("container.compose.up"), ups + 1);
}

#[tokio::test]
async fn start_failure_marks_error() {
    let h = harness();
    installed(&h).await;
    h.manager.stop("whoami").await.unwrap();

    h.agent.script(
        "container.compose.up",
        nos_agent::client::fake::FakeReply::failed("no runtime"),
    );
    let err = h.manager.start("whoami").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);

    let app = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(app.status, AppStatus::Error);
    assert!(app.error.is_some());
}

#[tokio::test]
async fn error_state_can_be_started_again() {
    let h = harness();
    installed(&h).await;
    h.manager.stop("whoami").await.unwrap();

    h.agent.script(
        "container.compose.up",
        nos_agent::client::fake::FakeReply::failed("no runtime"),
    );
    h.manager.start("whoami").await.unwrap_err();

    // Next attempt succeeds (default reply)
    let app = h.manager.start("whoami").await.unwrap();
    assert_eq!(app.status, AppStatus::Running);
    assert!(app.error.is_none());
}

#[tokio::test]
async fn unknown_app_operations_fail_not_found() {
    let h = harness();
    for result in [
        h.manager.start("ghost").await.err(),
        h.manager.stop("ghost").await.err(),
        h.manager.restart("ghost").await.err(),
    ] {
        let err = result.unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.body.code.contains("not_found"));
    }
}

#[tokio::test]
async fn reconcile_marks_vanished_app_stopped() {
    let h = harness();
    installed(&h).await;

    // Runtime now reports nothing for the project
    h.agent.default_reply(
        "container.status",
        nos_agent::client::fake::FakeReply::ok_with_stdout(""),
    );

    h.manager.reconcile().await.unwrap();
    let app = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(app.status, AppStatus::Stopped);
}

#[tokio::test]
async fn reconcile_leaves_running_app_alone() {
    let h = harness();
    installed(&h).await;
    let before = h.manager.get("whoami").unwrap().unwrap();

    h.manager.reconcile().await.unwrap();
    let after = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(after.status, AppStatus::Running);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn reconcile_marks_partial_state_unknown() {
    let h = harness();
    installed(&h).await;

    let two_states = format!(
        "{}\n{}\n",
        serde_json::json!({"State": "running", "Health": ""}),
        serde_json::json!({"State": "exited", "Health": ""}),
    );
    h.agent.default_reply(
        "container.status",
        nos_agent::client::fake::FakeReply::ok_with_stdout(two_states),
    );

    h.manager.reconcile().await.unwrap();
    let app = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(app.status, AppStatus::Unknown);
}
