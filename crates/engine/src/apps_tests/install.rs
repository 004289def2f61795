// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nos_core::ErrorKind;

#[tokio::test]
async fn install_reaches_running_and_persists() {
    let h = harness();
    let app = h
        .manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(app.status, AppStatus::Running);
    assert_eq!(app.version, "1.0.0");
    assert_eq!(app.snapshots.len(), 1);
    assert_eq!(app.snapshots[0].tag, "post-install");

    // Rendered artifacts on disk
    let compose = h.dir.path().join("apps/whoami/config/compose.yml");
    assert!(compose.exists());
    let compose_text = std::fs::read_to_string(&compose).unwrap();
    assert!(compose_text.contains("8080:80"));
    assert!(compose_text.contains("no-new-privileges:true"));
    assert!(h.dir.path().join("apps/whoami/config/.env").exists());
    assert!(h.dir.path().join("apps/whoami/data").exists());

    // Registry round-trips
    let loaded = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(loaded.status, AppStatus::Running);
    assert_eq!(loaded.params_digest, app.params_digest);

    // Transaction committed
    assert_eq!(last_tx_result(&h), TxResult::Committed);

    // The unit was started through the agent
    assert_eq!(h.agent.call_count("container.compose.up"), 1);

    // Proxy snippet with deterministic name, proxy reloaded
    assert!(h.dir.path().join("proxy.d/app-whoami").exists());
    assert_eq!(h.agent.call_count("proxy.reload"), 1);

    assert!(h.events.types().contains(&"app.install.started"));
    assert!(h.events.types().contains(&"app.install.completed"));
}

#[tokio::test]
async fn install_twice_is_a_precondition_error() {
    let h = harness();
    h.manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();

    let err = h
        .manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.body.code.contains("already_installed"));
}

#[tokio::test]
async fn unknown_catalog_id_fails_and_creates_no_files() {
    let h = harness();
    let err = h
        .manager
        .install("absent-app", BTreeMap::new(), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!h.dir.path().join("apps/absent-app").exists());
    assert!(h.manager.get("absent-app").unwrap().is_none());
    // No agent call was made
    assert!(h.agent.calls().is_empty());
}

#[tokio::test]
async fn invalid_params_fail_before_any_file_exists() {
    let h = harness();
    let err = h
        .manager
        .install("whoami", port_params("-1"), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!h.dir.path().join("apps/whoami").exists());
    assert!(h.index.list().unwrap().is_empty());
}

#[tokio::test]
async fn start_failure_marks_transaction_failed_and_writes_no_record() {
    let h = harness();
    h.agent.script(
        "container.compose.up",
        nos_agent::client::fake::FakeReply::failed("image pull backoff"),
    );

    let err = h
        .manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::External);
    assert!(h.manager.get("whoami").unwrap().is_none());
    assert_eq!(last_tx_result(&h), TxResult::Failed);
    assert!(h.events.types().contains(&"app.install.failed"));
    // The unit was stopped after the failure
    assert_eq!(h.agent.call_count("container.compose.down"), 1);
}

#[tokio::test]
async fn health_failure_rolls_install_back() {
    let h = harness();
    mark_unhealthy(&h.agent);

    let err = h
        .manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(h.manager.get("whoami").unwrap().is_none());
    assert_eq!(last_tx_result(&h), TxResult::Failed);
}

#[tokio::test]
async fn denied_verb_surfaces_as_external() {
    let h = harness();
    h.agent.script(
        "container.compose.up",
        nos_agent::client::fake::FakeReply::denied(),
    );

    let err = h
        .manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(err.body.code, "external.verb.denied");
}
