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
async fn upgrade_bumps_version_and_appends_snapshot() {
    let h = harness();
    installed(&h).await;

    let app = h
        .manager
        .upgrade("whoami", "1.1.0", None, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(app.version, "1.1.0");
    assert_eq!(app.status, AppStatus::Running);
    assert_eq!(app.snapshots.len(), 2);
    assert_eq!(app.snapshots[1].tag, "pre-upgrade");
    assert_eq!(last_tx_result(&h), TxResult::Committed);
    assert_eq!(h.agent.call_count("container.compose.pull"), 1);

    // Backups dropped on commit
    assert!(!h
        .dir
        .path()
        .join("apps/whoami/config/compose.yml.backup")
        .exists());
    assert!(h.events.types().contains(&"app.upgrade.completed"));
}

#[tokio::test]
async fn same_version_and_params_is_a_no_op() {
    let h = harness();
    installed(&h).await;
    let before_calls = h.agent.calls().len();

    let app = h
        .manager
        .upgrade("whoami", "1.0.0", None, &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(app.version, "1.0.0");
    assert_eq!(app.snapshots.len(), 1, "no new snapshot on no-op");
    assert_eq!(h.agent.calls().len(), before_calls, "no agent traffic on no-op");
}

#[tokio::test]
async fn invalid_params_leave_app_and_snapshots_untouched() {
    let h = harness();
    installed(&h).await;
    let before = h.manager.get("whoami").unwrap().unwrap();

    let err = h
        .manager
        .upgrade("whoami", "vBAD", Some(port_params("-1")), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);

    let after = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(after, before, "registry record unchanged");
    // Validation precedes the snapshot: only the post-install one exists.
    assert_eq!(after.snapshots.len(), 1);
    assert_eq!(after.snapshots[0].tag, "post-install");
}

#[tokio::test]
async fn upgrade_of_uninstalled_app_is_a_precondition_error() {
    let h = harness();
    let err = h
        .manager
        .upgrade("whoami", "1.1.0", None, &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[tokio::test]
async fn failed_upgrade_rolls_back_and_marks_error() {
    let h = harness();
    installed(&h).await;
    let original_compose =
        std::fs::read_to_string(h.dir.path().join("apps/whoami/config/compose.yml")).unwrap();

    // The upgrade's compose up fails; the rollback's compose up succeeds.
    h.agent.script(
        "container.compose.up",
        nos_agent::client::fake::FakeReply::failed("bad image"),
    );

    let err = h
        .manager
        .upgrade("whoami", "2.0.0", Some(port_params("9090")), &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);

    let app = h.manager.get("whoami").unwrap().unwrap();
    // Originating version reinstated, app marked error
    assert_eq!(app.version, "1.0.0");
    assert_eq!(app.status, AppStatus::Error);
    assert!(app.error.is_some());

    // Files restored from the backup copies
    let compose =
        std::fs::read_to_string(h.dir.path().join("apps/whoami/config/compose.yml")).unwrap();
    assert_eq!(compose, original_compose);

    assert_eq!(last_tx_result(&h), TxResult::Failed);
    assert!(h.events.types().contains(&"app.upgrade.failed"));

    // Rollback restarted the app on the old config
    assert!(h.agent.call_count("container.compose.up") >= 2);
}

#[tokio::test]
async fn unhealthy_upgrade_rolls_back() {
    let h = harness();
    installed(&h).await;

    mark_unhealthy(&h.agent);

    let err = h
        .manager
        .upgrade("whoami", "2.0.0", None, &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let app = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(app.version, "1.0.0");
    assert_eq!(app.status, AppStatus::Error);
}

#[tokio::test]
async fn retention_keeps_newest_n_snapshots() {
    let h = harness_with_keep(3);
    installed(&h).await;

    for i in 2..=6 {
        h.manager
            .upgrade("whoami", &format!("{i}.0.0"), None, &CancelToken::new())
            .await
            .unwrap();
    }

    let app = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(app.snapshots.len(), 3, "exactly keep_n snapshots at steady state");

    // The kept snapshots are the newest ones
    let mut created: Vec<_> = app.snapshots.iter().map(|s| s.created_at).collect();
    let mut sorted = created.clone();
    sorted.sort();
    created.sort();
    assert_eq!(created, sorted);

    // Pruned snapshot files are gone from disk
    let files: Vec<_> = std::fs::read_dir(h.dir.path().join("apps/.snapshots/whoami"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 3, "{files:?}");

    assert!(h.events.types().contains(&"snapshot.pruned"));
}

#[tokio::test]
async fn cancellation_during_health_wait_rolls_back() {
    let h = harness();
    installed(&h).await;

    let cancel = CancelToken::new();
    cancel.cancel();

    let err = h
        .manager
        .upgrade("whoami", "2.0.0", None, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.body.code.contains("cancelled"));

    let app = h.manager.get("whoami").unwrap().unwrap();
    assert_eq!(app.version, "1.0.0");
    assert_eq!(app.status, AppStatus::Error);
}
