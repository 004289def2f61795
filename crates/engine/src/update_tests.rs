// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::events::recording::RecordingSink;
use nos_agent::client::fake::{FakeAgent, FakeReply};
use nos_core::{ErrorKind, SystemClock};

struct Harness {
    dir: tempfile::TempDir,
    engine: UpdateEngine,
    agent: Arc<FakeAgent>,
    events: RecordingSink,
    index: TxIndex,
}

fn harness() -> Harness {
    harness_with(|_config| {})
}

fn harness_with(tweak: impl FnOnce(&mut UpdateConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();

    // One tar-mode target with real content to snapshot
    let etc = dir.path().join("etc");
    std::fs::create_dir_all(&etc).unwrap();
    std::fs::write(etc.join("fstab"), b"v1").unwrap();

    let agent = Arc::new(FakeAgent::new());
    agent.default_reply(
        "fs.is_cow",
        FakeReply::ok_with_result(serde_json::json!({"cow": false})),
    );

    let index = TxIndex::new(dir.path().join("index.json"));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let snapshots = Arc::new(SnapshotService::new(
        Arc::clone(&agent) as Arc<dyn AgentClient>,
        index.clone(),
        Arc::clone(&clock),
    ));
    let events = RecordingSink::new();

    let mut config = UpdateConfig {
        state_path: dir.path().join("update/state.json"),
        lock_path: dir.path().join("update/lock"),
        snapshot_root: dir.path().join("snapshots"),
        targets: vec![UpdateTargetConfig {
            id: "etc".into(),
            path: etc,
            mode: SnapshotMode::Auto,
            stop_services: vec!["smbd.service".into()],
        }],
        disk_floor_bytes: 1, // effectively disabled for tests
        critical_services: vec!["nosd.service".into()],
        health_url: None,
        keep_snapshots: 5,
    };
    tweak(&mut config);

    let engine = UpdateEngine::new(
        config,
        Arc::clone(&agent) as Arc<dyn AgentClient>,
        snapshots,
        index.clone(),
        clock,
        Arc::new(events.clone()),
    );

    Harness {
        dir,
        engine,
        agent,
        events,
        index,
    }
}

#[tokio::test]
async fn apply_commits_and_snapshots() {
    let h = harness();
    let tx_id = h.engine.apply(&CancelToken::new()).await.unwrap();

    let doc = h.engine.status().unwrap();
    assert_eq!(doc.state, UpdateState::Success);
    assert_eq!(doc.tx_id, Some(tx_id.clone()));
    assert!(doc.finished_at.is_some());

    let tx = h.index.get(&tx_id).unwrap().unwrap();
    assert_eq!(tx.result, TxResult::Committed);
    assert_eq!(tx.targets.len(), 1);
    let snapshot = tx.targets[0].snapshot.as_ref().unwrap();
    assert!(snapshot.path.exists());
    assert!(snapshot.id.as_str().ends_with("-pre-update"));
    // Tar snapshot landed under <root>/<slug(path)>/
    assert!(snapshot
        .path
        .starts_with(h.dir.path().join("snapshots")));

    // The package manager pipeline ran in order
    let pkg_calls: Vec<String> = h
        .agent
        .calls()
        .into_iter()
        .filter(|(verb, _)| verb.starts_with("pkg."))
        .map(|(verb, _)| verb)
        .collect();
    assert_eq!(
        pkg_calls,
        ["pkg.refresh", "pkg.verify_keys", "pkg.stage", "pkg.upgrade", "pkg.prune_cache"]
    );

    // Services were stopped for the snapshot and restarted
    assert_eq!(h.agent.call_count("service.stop"), 1);
    assert_eq!(h.agent.call_count("service.start"), 1);
    // Critical service verified in postflight
    assert_eq!(h.agent.call_count("service.is_active"), 1);

    assert!(h.events.types().contains(&"update.completed"));
    assert!(h.events.types().contains(&"snapshot.created"));
}

#[tokio::test]
async fn preflight_disk_floor_fails_before_any_snapshot() {
    let h = harness_with(|config| config.disk_floor_bytes = u64::MAX);

    let err = h.engine.apply(&CancelToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.body.code.contains("preflight_disk"));

    let doc = h.engine.status().unwrap();
    assert_eq!(doc.state, UpdateState::Failed);
    assert!(h.index.list().unwrap().is_empty(), "no transaction started");
    assert_eq!(h.agent.call_count("pkg.stage"), 0);
}

#[tokio::test]
async fn failed_upgrade_rolls_back_targets() {
    let h = harness();
    h.agent
        .script("pkg.upgrade", FakeReply::failed("held packages"));

    let err = h.engine.apply(&CancelToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::External);

    let doc = h.engine.status().unwrap();
    assert_eq!(doc.state, UpdateState::RolledBack);

    // Original tx failed → rolled_back with a back-reference to the
    // committed rollback transaction.
    let txs = h.index.list().unwrap();
    assert_eq!(txs.len(), 2);
    assert_eq!(txs[0].result, TxResult::RolledBack);
    assert_eq!(txs[0].rolled_back_by, Some(txs[1].tx_id.clone()));
    assert_eq!(txs[1].result, TxResult::Committed);

    assert!(h.events.types().contains(&"update.rolled_back"));
}

#[tokio::test]
async fn failed_critical_service_triggers_rollback() {
    let h = harness();
    h.agent
        .script("service.is_active", FakeReply::failed("inactive"));

    h.engine.apply(&CancelToken::new()).await.unwrap_err();
    let doc = h.engine.status().unwrap();
    assert_eq!(doc.state, UpdateState::RolledBack);
}

#[tokio::test]
async fn second_apply_while_locked_is_a_precondition_error() {
    let h = harness();
    let _held = FileLock::try_acquire(&h.dir.path().join("update/lock")).unwrap();

    let err = h.engine.apply(&CancelToken::new()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(err.body.code.contains("update_in_progress"));
}

#[tokio::test]
async fn check_updates_last_check_only() {
    let h = harness();
    let doc = h.engine.check().await.unwrap();
    assert!(doc.last_check.is_some());
    assert_eq!(doc.state, UpdateState::Idle);
    assert_eq!(h.agent.call_count("pkg.refresh"), 1);
}

#[tokio::test]
async fn interrupted_run_is_failed_on_recovery() {
    let h = harness();

    // Simulate a daemon killed mid-install: state Applying, pending tx.
    let tx_id = TxId::new("tx-interrupted");
    h.index
        .begin(Transaction::new(
            tx_id.clone(),
            chrono::Utc::now(),
            TxKind::SystemUpdate,
            vec![],
        ))
        .unwrap();
    let mut doc = UpdateStateDoc::default();
    doc.state = UpdateState::Applying;
    doc.tx_id = Some(tx_id.clone());
    nos_store::save_json(&h.dir.path().join("update/state.json"), &doc).unwrap();

    let interrupted_in = h.engine.recover_interrupted().unwrap();
    assert_eq!(interrupted_in, Some(UpdateState::Applying));

    let doc = h.engine.status().unwrap();
    assert_eq!(doc.state, UpdateState::Failed);
    assert_eq!(doc.reason.as_deref(), Some("interrupted"));

    let tx = h.index.get(&tx_id).unwrap().unwrap();
    assert_eq!(tx.result, TxResult::Failed);
    assert_eq!(tx.reason.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn recovery_is_a_no_op_for_terminal_and_idle_states() {
    let h = harness();
    assert_eq!(h.engine.recover_interrupted().unwrap(), None);

    h.engine.apply(&CancelToken::new()).await.unwrap();
    assert_eq!(h.engine.recover_interrupted().unwrap(), None);
    assert_eq!(h.engine.status().unwrap().state, UpdateState::Success);
}

#[tokio::test]
async fn manual_rollback_restores_and_back_references() {
    let h = harness();
    let tx_id = h.engine.apply(&CancelToken::new()).await.unwrap();

    // Mutate the target after the committed update
    std::fs::write(h.dir.path().join("etc/fstab"), b"v2").unwrap();

    let rollback_tx = h.engine.rollback(&tx_id).await.unwrap();

    // Target restored to the pre-update snapshot content
    assert_eq!(
        std::fs::read(h.dir.path().join("etc/fstab")).unwrap(),
        b"v1"
    );

    let doc = h.engine.status().unwrap();
    assert_eq!(doc.state, UpdateState::RolledBack);

    let old = h.index.get(&tx_id).unwrap().unwrap();
    assert_eq!(old.result, TxResult::RolledBack);
    assert_eq!(old.rolled_back_by, Some(rollback_tx));
}

#[tokio::test]
async fn rollback_of_unknown_transaction_fails() {
    let h = harness();
    let err = h.engine.rollback(&TxId::new("ghost")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn cancellation_before_install_fails_the_run() {
    let h = harness();
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = h.engine.apply(&cancel).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(h.engine.status().unwrap().state, UpdateState::Failed);
    assert_eq!(h.agent.call_count("pkg.upgrade"), 0);
}
