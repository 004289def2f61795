// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A daemon killed mid-install leaves a failed/interrupted run, a
//! failed transaction, and the pre-update snapshot on disk.

use super::prelude::*;
use nos_core::{
    SnapshotId, SnapshotKind, SnapshotRef, Transaction, TxId, TxKind, TxResult, TxTarget,
    UpdateState, UpdateStateDoc,
};
use nos_store::TxIndex;

#[tokio::test]
async fn interrupted_install_is_failed_on_restart() {
    // First "boot": seed the state a killed daemon would leave behind —
    // a pre-update snapshot, a pending transaction, and a state file
    // persisted at the applying phase boundary.
    let dir = tempfile::tempdir().unwrap();
    let config = nos_daemon::Config::with_root(dir.path());
    std::fs::create_dir_all(dir.path().join("etc")).unwrap();
    std::fs::write(dir.path().join("etc/fstab"), b"v1").unwrap();
    seed_catalog(&config);

    let snapshot_path = dir
        .path()
        .join("snapshots/etc-slug/20260101-000000-pre-update.tar.gz");
    std::fs::create_dir_all(snapshot_path.parent().unwrap()).unwrap();
    std::fs::write(&snapshot_path, b"archive").unwrap();

    let snapshot = SnapshotRef {
        id: SnapshotId::new("20260101-000000-pre-update"),
        kind: SnapshotKind::Tar,
        path: snapshot_path.clone(),
        created_at: chrono::Utc::now(),
        tag: "pre-update".into(),
    };
    let tx_id = TxId::new("tx-interrupted");
    TxIndex::new(config.tx_index_path())
        .begin(Transaction::new(
            tx_id.clone(),
            chrono::Utc::now(),
            TxKind::SystemUpdate,
            vec![TxTarget {
                target_id: "etc".into(),
                path: dir.path().join("etc"),
                snapshot: Some(snapshot),
            }],
        ))
        .unwrap();

    let mut doc = UpdateStateDoc::default();
    doc.state = UpdateState::Applying;
    doc.tx_id = Some(tx_id.clone());
    nos_store::save_json(&config.update_state_path(), &doc).unwrap();

    // Restart
    let core = nos_daemon::lifecycle::startup_with(
        config,
        std::sync::Arc::new(nos_agent::client::fake::FakeAgent::new()),
        Box::new(ScriptedFetcher::new()),
    )
    .await
    .unwrap();

    let doc = core.updates.status().unwrap();
    assert_eq!(doc.state, UpdateState::Failed);
    assert_eq!(doc.reason.as_deref(), Some("interrupted"));

    // Transaction marked failed, not silently committed
    let tx = core.index.get(&tx_id).unwrap().unwrap();
    assert_eq!(tx.result, TxResult::Failed);

    // The pre-update snapshot survives for manual rollback
    assert!(snapshot_path.exists());

    // No partial commit: rollback of a partial install needs a human
    let committed = core
        .index
        .list()
        .unwrap()
        .iter()
        .filter(|t| t.result == TxResult::Committed)
        .count();
    assert_eq!(committed, 0);
}

#[tokio::test]
async fn completed_update_survives_restart_untouched() {
    let s = specs().await;
    let tx_id = s
        .core
        .updates
        .apply(&nos_core::CancelToken::new())
        .await
        .unwrap();
    assert_eq!(
        s.core.updates.status().unwrap().state,
        UpdateState::Success
    );

    // Recovery on a terminal state is a no-op
    assert!(s.core.updates.recover_interrupted().unwrap().is_none());
    let tx = s.core.index.get(&tx_id).unwrap().unwrap();
    assert_eq!(tx.result, TxResult::Committed);
}
