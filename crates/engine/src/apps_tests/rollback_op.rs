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
async fn rollback_restores_data_and_returns_to_running() {
    let h = harness();
    installed(&h).await;

    // Seed data, snapshot it via an upgrade, then diverge
    std::fs::write(h.dir.path().join("apps/whoami/data/state.db"), b"v1").unwrap();
    h.manager
        .upgrade("whoami", "1.1.0", None, &CancelToken::new())
        .await
        .unwrap();
    std::fs::write(h.dir.path().join("apps/whoami/data/state.db"), b"v2").unwrap();

    let app = h.manager.get("whoami").unwrap().unwrap();
    let pre_upgrade = app
        .snapshots
        .iter()
        .find(|s| s.tag == "pre-upgrade")
        .unwrap()
        .clone();

    let app = h
        .manager
        .rollback("whoami", &pre_upgrade.id, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(app.status, AppStatus::Running);
    assert_eq!(
        std::fs::read(h.dir.path().join("apps/whoami/data/state.db")).unwrap(),
        b"v1"
    );
    assert_eq!(last_tx_result(&h), TxResult::Committed);
    assert!(h.events.types().contains(&"app.rollback.completed"));
}

#[tokio::test]
async fn rollback_to_unknown_snapshot_fails() {
    let h = harness();
    installed(&h).await;

    let err = h
        .manager
        .rollback("whoami", &SnapshotId::new("ghost"), &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.body.code.contains("not_found"));
}

#[tokio::test]
async fn failed_rollback_marks_error() {
    let h = harness();
    installed(&h).await;
    let app = h.manager.get("whoami").unwrap().unwrap();
    let snapshot = app.snapshots[0].clone();

    // The restart after restore fails
    h.agent.script(
        "container.compose.down",
        nos_agent::client::fake::FakeReply::ok(),
    );
    h.agent.script(
        "container.compose.up",
        nos_agent::client::fake::FakeReply::failed("runtime gone"),
    );

    let err = h
        .manager
        .rollback("whoami", &snapshot.id, &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);

    let app = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(app.status, AppStatus::Error);
    assert_eq!(last_tx_result(&h), TxResult::Failed);
    assert!(h.events.types().contains(&"app.rollback.failed"));
}

#[tokio::test]
async fn rollback_from_error_state_recovers() {
    let h = harness();
    installed(&h).await;
    let snapshot = h.manager.get("whoami").unwrap().unwrap().snapshots[0].clone();

    // Drive the app into error via a failed start
    h.manager.stop("whoami").await.unwrap();
    h.agent.script(
        "container.compose.up",
        nos_agent::client::fake::FakeReply::failed("boom"),
    );
    h.manager.start("whoami").await.unwrap_err();

    let app = h
        .manager
        .rollback("whoami", &snapshot.id, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(app.status, AppStatus::Running);
    assert!(app.error.is_none());
}
