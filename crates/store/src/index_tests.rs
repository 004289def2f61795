// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use nos_core::{SnapshotKind, SnapshotRef, TxKind, TxTarget};

fn index(dir: &tempfile::TempDir) -> TxIndex {
    TxIndex::new(dir.path().join("index.json"))
}

fn tx(id: &str, with_snapshot: bool) -> Transaction {
    let snapshot = with_snapshot.then(|| SnapshotRef {
        id: SnapshotId::new(format!("{id}-snap")),
        kind: SnapshotKind::Tar,
        path: "/var/lib/nos/snapshots/etc/x.tar.gz".into(),
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        tag: "pre-update".into(),
    });
    Transaction::new(
        TxId::new(id),
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        TxKind::SystemUpdate,
        vec![TxTarget {
            target_id: "etc".into(),
            path: "/etc".into(),
            snapshot,
        }],
    )
}

#[test]
fn begin_then_list() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);

    idx.begin(tx("tx-1", false)).unwrap();
    idx.begin(tx("tx-2", false)).unwrap();

    let txs = idx.list().unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].tx_id, "tx-1");
    assert_eq!(txs[1].tx_id, "tx-2");
}

#[test]
fn commit_transitions_pending_to_committed() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    idx.begin(tx("tx-1", false)).unwrap();

    idx.commit(&TxId::new("tx-1")).unwrap();
    let t = idx.get(&TxId::new("tx-1")).unwrap().unwrap();
    assert_eq!(t.result, TxResult::Committed);
}

#[test]
fn commit_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    idx.begin(tx("tx-1", false)).unwrap();
    idx.commit(&TxId::new("tx-1")).unwrap();

    let err = idx.commit(&TxId::new("tx-1")).unwrap_err();
    assert!(matches!(err, StoreError::TxState { .. }));
}

#[test]
fn fail_records_reason() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    idx.begin(tx("tx-1", false)).unwrap();

    idx.fail(&TxId::new("tx-1"), "interrupted").unwrap();
    let t = idx.get(&TxId::new("tx-1")).unwrap().unwrap();
    assert_eq!(t.result, TxResult::Failed);
    assert_eq!(t.reason.as_deref(), Some("interrupted"));
}

#[test]
fn rolled_back_keeps_back_reference() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    idx.begin(tx("tx-1", false)).unwrap();
    idx.commit(&TxId::new("tx-1")).unwrap();

    idx.mark_rolled_back(&TxId::new("tx-1"), &TxId::new("tx-2"))
        .unwrap();
    let t = idx.get(&TxId::new("tx-1")).unwrap().unwrap();
    assert_eq!(t.result, TxResult::RolledBack);
    assert_eq!(t.rolled_back_by, Some(TxId::new("tx-2")));
}

#[test]
fn rollback_of_pending_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    idx.begin(tx("tx-1", false)).unwrap();

    let err = idx
        .mark_rolled_back(&TxId::new("tx-1"), &TxId::new("tx-2"))
        .unwrap_err();
    assert!(matches!(err, StoreError::TxState { .. }));
}

#[test]
fn unknown_tx_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    let err = idx.commit(&TxId::new("missing")).unwrap_err();
    assert!(matches!(err, StoreError::TxNotFound(_)));
}

#[test]
fn pending_transactions_pin_their_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    idx.begin(tx("tx-1", true)).unwrap();
    idx.begin(tx("tx-2", true)).unwrap();
    idx.commit(&TxId::new("tx-2")).unwrap();

    let pinned = idx.pinned_snapshots().unwrap();
    assert_eq!(pinned, vec![SnapshotId::new("tx-1-snap")]);
}

#[test]
fn read_back_is_byte_identical_to_last_write() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    idx.begin(tx("tx-1", true)).unwrap();
    idx.commit(&TxId::new("tx-1")).unwrap();

    let first = std::fs::read(dir.path().join("index.json")).unwrap();
    let again = std::fs::read(dir.path().join("index.json")).unwrap();
    assert_eq!(first, again);

    // Reload and re-list: parsing is lossless
    let txs = idx.list().unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].result, TxResult::Committed);
}

#[test]
fn newer_version_document_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    std::fs::write(&path, r#"{"version": 99, "transactions": []}"#).unwrap();

    let idx = TxIndex::new(&path);
    let err = idx.list().unwrap_err();
    assert!(matches!(err, StoreError::NewerVersion { found: 99, .. }));
}

#[test]
fn lock_file_sits_beside_index() {
    let dir = tempfile::tempdir().unwrap();
    let idx = index(&dir);
    idx.begin(tx("tx-1", false)).unwrap();
    assert!(dir.path().join("index.json.lock").exists());
}
