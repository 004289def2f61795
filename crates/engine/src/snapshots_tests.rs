// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nos_agent::client::fake::{FakeAgent, FakeReply};
use nos_core::{SystemClock, Transaction, TxId, TxKind, TxTarget};

fn service(dir: &tempfile::TempDir) -> (SnapshotService, Arc<FakeAgent>) {
    let agent = Arc::new(FakeAgent::new());
    let index = TxIndex::new(dir.path().join("index.json"));
    let service = SnapshotService::new(
        Arc::clone(&agent) as Arc<dyn AgentClient>,
        index,
        Arc::new(SystemClock),
    );
    (service, agent)
}

fn tar_target(dir: &tempfile::TempDir, name: &str) -> SnapshotTarget {
    SnapshotTarget {
        id: name.to_string(),
        path: dir.path().join(name),
        mode: SnapshotMode::Tar,
        snapshot_dir: dir.path().join(".snapshots").join(name),
    }
}

fn populate(path: &std::path::Path) {
    std::fs::create_dir_all(path).unwrap();
    std::fs::write(path.join("config.txt"), b"v1").unwrap();
    std::fs::create_dir_all(path.join("sub")).unwrap();
    std::fs::write(path.join("sub/deep.txt"), b"deep").unwrap();
}

#[tokio::test]
async fn tar_snapshot_create_and_restore_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _agent) = service(&dir);
    let target = tar_target(&dir, "etc");
    populate(&target.path);

    let snapshot = service.create(&target, "pre-update").await.unwrap();
    assert_eq!(snapshot.kind, SnapshotKind::Tar);
    assert!(snapshot.path.exists());
    assert!(snapshot.id.as_str().ends_with("-pre-update"));

    // Mutate, then restore
    std::fs::write(target.path.join("config.txt"), b"v2").unwrap();
    std::fs::write(target.path.join("extra.txt"), b"junk").unwrap();

    service.restore(&target.path, &snapshot).await.unwrap();

    assert_eq!(
        std::fs::read(target.path.join("config.txt")).unwrap(),
        b"v1"
    );
    assert_eq!(
        std::fs::read(target.path.join("sub/deep.txt")).unwrap(),
        b"deep"
    );
    // The restored tree is the snapshot state; later files are gone.
    assert!(!target.path.join("extra.txt").exists());
    // No rollback-backup left behind after success
    assert!(!dir.path().join("etc.rollback-backup").exists());
}

#[tokio::test]
async fn tar_snapshot_is_written_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _agent) = service(&dir);
    let target = tar_target(&dir, "etc");
    populate(&target.path);

    let snapshot = service.create(&target, "pre-update").await.unwrap();
    // No temp file left beside the archive
    let siblings: Vec<_> = std::fs::read_dir(snapshot.path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(siblings.iter().all(|n| !n.ends_with(".tmp")), "{siblings:?}");
}

#[tokio::test]
async fn cow_snapshot_goes_through_the_agent() {
    let dir = tempfile::tempdir().unwrap();
    let (service, agent) = service(&dir);
    let target = SnapshotTarget {
        id: "appdata".into(),
        path: dir.path().join("appdata"),
        mode: SnapshotMode::Cow,
        snapshot_dir: dir.path().join(".snapshots/appdata"),
    };

    let snapshot = service.create(&target, "pre-upgrade").await.unwrap();
    assert_eq!(snapshot.kind, SnapshotKind::CowSubvolume);

    let calls = agent.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "fs.subvolume.snapshot");
    assert_eq!(calls[0].1["readonly"], true);
}

#[tokio::test]
async fn auto_mode_resolves_via_fs_is_cow() {
    let dir = tempfile::tempdir().unwrap();
    let (service, agent) = service(&dir);
    agent.default_reply(
        "fs.is_cow",
        FakeReply::ok_with_result(serde_json::json!({"cow": false})),
    );

    let mut target = tar_target(&dir, "etc");
    target.mode = SnapshotMode::Auto;
    populate(&target.path);

    let snapshot = service.create(&target, "pre-update").await.unwrap();
    assert_eq!(snapshot.kind, SnapshotKind::Tar);
    assert_eq!(agent.call_count("fs.is_cow"), 1);
}

#[tokio::test]
async fn failed_tar_restore_renames_live_back() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _agent) = service(&dir);
    let target = tar_target(&dir, "etc");
    populate(&target.path);

    // A snapshot ref pointing at a missing archive
    let snapshot = SnapshotRef {
        id: SnapshotId::new("20260101-000000-pre-update"),
        kind: SnapshotKind::Tar,
        path: dir.path().join("missing.tar.gz"),
        created_at: chrono::Utc::now(),
        tag: "pre-update".into(),
    };

    service.restore(&target.path, &snapshot).await.unwrap_err();
    // Live tree untouched
    assert_eq!(std::fs::read(target.path.join("config.txt")).unwrap(), b"v1");
}

#[tokio::test]
async fn prune_deletes_oldest_beyond_keep_n() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _agent) = service(&dir);
    let target = tar_target(&dir, "etc");
    populate(&target.path);

    let mut snapshots = Vec::new();
    for i in 0..5 {
        let mut snapshot = service.create(&target, "pre-upgrade").await.unwrap();
        // Stagger created_at so ordering is unambiguous
        snapshot.created_at += chrono::Duration::seconds(i);
        snapshots.push(snapshot);
    }

    let outcome = service.prune(&snapshots, 3).await.unwrap();
    assert_eq!(outcome.deleted.len(), 2);
    assert_eq!(outcome.kept.len(), 3);
    assert_eq!(outcome.deleted[0], snapshots[0].id);
    assert_eq!(outcome.deleted[1], snapshots[1].id);
    assert!(!snapshots[0].path.exists());
    assert!(snapshots[4].path.exists());
}

#[tokio::test]
async fn prune_never_deletes_pinned_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let agent = Arc::new(FakeAgent::new());
    let index = TxIndex::new(dir.path().join("index.json"));
    let service = SnapshotService::new(
        Arc::clone(&agent) as Arc<dyn AgentClient>,
        index.clone(),
        Arc::new(SystemClock),
    );

    let target = tar_target(&dir, "etc");
    populate(&target.path);

    let mut snapshots = Vec::new();
    for i in 0..4 {
        let mut snapshot = service.create(&target, "pre-upgrade").await.unwrap();
        snapshot.created_at += chrono::Duration::seconds(i);
        snapshots.push(snapshot);
    }

    // Pin the oldest via a pending transaction
    index
        .begin(Transaction::new(
            TxId::new("tx-pin"),
            chrono::Utc::now(),
            TxKind::AppUpgrade,
            vec![TxTarget {
                target_id: "etc".into(),
                path: target.path.clone(),
                snapshot: Some(snapshots[0].clone()),
            }],
        ))
        .unwrap();

    let outcome = service.prune(&snapshots, 1).await.unwrap();
    assert!(!outcome.deleted.contains(&snapshots[0].id));
    assert!(snapshots[0].path.exists());
    // Unpinned old ones were deleted
    assert!(outcome.deleted.contains(&snapshots[1].id));
}

#[tokio::test]
async fn list_parses_ids_and_orders_by_time() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _agent) = service(&dir);
    let target = tar_target(&dir, "etc");

    std::fs::create_dir_all(&target.snapshot_dir).unwrap();
    std::fs::write(
        target.snapshot_dir.join("20260102-000000-pre-update.tar.gz"),
        b"",
    )
    .unwrap();
    std::fs::write(
        target.snapshot_dir.join("20260101-000000-pre-update.tar.gz"),
        b"",
    )
    .unwrap();
    // Foreign file is skipped
    std::fs::write(target.snapshot_dir.join("README"), b"").unwrap();

    let listed = service.list(&target).unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].created_at < listed[1].created_at);
    assert_eq!(listed[0].tag, "pre-update");
    assert_eq!(listed[0].kind, SnapshotKind::Tar);
}

#[tokio::test]
async fn same_second_snapshots_get_distinct_ids() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _agent) = service(&dir);
    let target = tar_target(&dir, "etc");
    populate(&target.path);

    let a = service.create(&target, "pre-upgrade").await.unwrap();
    let b = service.create(&target, "pre-upgrade").await.unwrap();
    let c = service.create(&target, "pre-upgrade").await.unwrap();

    assert_ne!(a.id, b.id);
    assert_ne!(b.id, c.id);
}

#[test]
fn snapshot_id_parsing() {
    let (at, tag) = parse_snapshot_id("20260213-154502-pre-upgrade").unwrap();
    assert_eq!(tag, "pre-upgrade");
    assert_eq!(timestamp_slug(at), "20260213-154502");

    assert!(parse_snapshot_id("garbage").is_none());
    assert!(parse_snapshot_id("20260213-154502").is_none()); // no tag
}
