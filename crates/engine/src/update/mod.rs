// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! System update engine: snapshot-backed package updates that survive
//! interruption.
//!
//! Exactly one update runs at a time, enforced by an exclusive file lock
//! on the state file's sibling lock. The state document is persisted
//! after every phase boundary; a daemon restart that finds a non-idle,
//! non-terminal state marks the run `failed` with reason `interrupted`.

use crate::error::EngineError;
use crate::events::EventSink;
use crate::snapshots::{SnapshotMode, SnapshotService, SnapshotTarget};
use nos_core::update::UPDATE_DOC_VERSION;
use nos_core::{
    slugify, CancelToken, Clock, Event, IdGen, Transaction, TxId, TxKind, TxResult, TxTarget,
    UpdateProgress, UpdateState, UpdateStateDoc, UuidIdGen,
};
use nos_agent::AgentClient;
use nos_store::{FileLock, TxIndex};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default disk-space floor on target mounts (2 GiB).
pub const DEFAULT_DISK_FLOOR: u64 = 2 * 1024 * 1024 * 1024;

/// One configured snapshot target of the update run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UpdateTargetConfig {
    pub id: String,
    pub path: PathBuf,
    #[serde(default = "default_mode")]
    pub mode: SnapshotMode,
    /// Units stopped around the snapshot of this target.
    #[serde(default)]
    pub stop_services: Vec<String>,
}

fn default_mode() -> SnapshotMode {
    SnapshotMode::Auto
}

/// Update engine configuration.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Persisted run state (`update/state.json`).
    pub state_path: PathBuf,
    /// Exclusive run lock (`update/lock`).
    pub lock_path: PathBuf,
    /// Root for tar snapshots (`<root>/<slug(path)>/<ts>-pre-update.tar.gz`).
    pub snapshot_root: PathBuf,
    pub targets: Vec<UpdateTargetConfig>,
    pub disk_floor_bytes: u64,
    /// Units that must be `active` after the upgrade.
    pub critical_services: Vec<String>,
    /// Local UI health endpoint checked in postflight, when configured.
    pub health_url: Option<String>,
    /// Newest-N retention for update snapshots, per target.
    pub keep_snapshots: usize,
}

/// The update engine.
pub struct UpdateEngine {
    config: UpdateConfig,
    agent: Arc<dyn AgentClient>,
    snapshots: Arc<SnapshotService>,
    index: TxIndex,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    id_gen: UuidIdGen,
}

impl UpdateEngine {
    pub fn new(
        config: UpdateConfig,
        agent: Arc<dyn AgentClient>,
        snapshots: Arc<SnapshotService>,
        index: TxIndex,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            agent,
            snapshots,
            index,
            clock,
            events,
            id_gen: UuidIdGen,
        }
    }

    /// Current persisted run state.
    pub fn status(&self) -> Result<UpdateStateDoc, EngineError> {
        let doc: Option<UpdateStateDoc> = nos_store::load_json(&self.config.state_path)?;
        match doc {
            Some(doc) if doc.version > UPDATE_DOC_VERSION => Err(EngineError::fatal(
                "state_version",
                format!(
                    "update state is version {}, newer than supported {}",
                    doc.version, UPDATE_DOC_VERSION
                ),
            )),
            Some(doc) => Ok(doc),
            None => Ok(UpdateStateDoc::default()),
        }
    }

    fn save_doc(&self, doc: &UpdateStateDoc) -> Result<(), EngineError> {
        nos_store::save_json(&self.config.state_path, doc)?;
        Ok(())
    }

    /// Advance the state machine, persist, and announce progress.
    fn set_state(
        &self,
        doc: &mut UpdateStateDoc,
        next: UpdateState,
        percent: u8,
        message: &str,
    ) -> Result<(), EngineError> {
        if next != doc.state && !doc.state.can_transition(next) {
            warn!(from = %doc.state, to = %next, "unexpected update state transition");
        }
        doc.state = next;
        doc.progress = UpdateProgress {
            state: next,
            percent,
            message: message.to_string(),
        };
        self.save_doc(doc)?;
        self.events.publish(Event::UpdateStateChanged {
            state: next,
            percent,
            message: message.to_string(),
        });
        Ok(())
    }

    /// Refresh package metadata and record `last_check`.
    ///
    /// Safe to run while an apply is in flight: when the run lock is
    /// held, the timestamp is simply not persisted so the runner's state
    /// file is never touched concurrently.
    pub async fn check(&self) -> Result<UpdateStateDoc, EngineError> {
        self.agent.call("pkg.refresh", serde_json::json!({})).await?;

        match FileLock::try_acquire(&self.config.lock_path) {
            Ok(_lock) => {
                let mut doc = self.status()?;
                doc.last_check = Some(self.clock.now());
                self.save_doc(&doc)?;
                Ok(doc)
            }
            Err(_) => self.status(),
        }
    }

    /// Run a full update: preflight → snapshot → download → install →
    /// postflight → cleanup. Returns the committed transaction id.
    pub async fn apply(&self, cancel: &CancelToken) -> Result<TxId, EngineError> {
        let _lock = FileLock::try_acquire(&self.config.lock_path).map_err(|_| {
            EngineError::precondition("update_in_progress", "another update run holds the lock")
        })?;

        let mut doc = self.status()?;
        doc.started_at = Some(self.clock.now());
        doc.finished_at = None;
        doc.reason = None;
        doc.tx_id = None;

        // -- Preflight --
        self.set_state(&mut doc, UpdateState::Checking, 10, "preflight checks")?;
        if let Err(e) = self.preflight().await {
            return Err(self.fail_run(&mut doc, None, e)?);
        }

        if cancel.is_cancelled() {
            let e = EngineError::timeout("cancelled", "update cancelled before snapshot");
            return Err(self.fail_run(&mut doc, None, e)?);
        }

        // -- Snapshot --
        self.set_state(&mut doc, UpdateState::Downloading, 30, "snapshotting targets")?;
        let targets = match self.snapshot_targets().await {
            Ok(targets) => targets,
            Err(e) => return Err(self.fail_run(&mut doc, None, e)?),
        };

        let tx_id = TxId::new(self.id_gen.next());
        self.index.begin(Transaction::new(
            tx_id.clone(),
            self.clock.now(),
            TxKind::SystemUpdate,
            targets.clone(),
        ))?;
        doc.tx_id = Some(tx_id.clone());
        self.save_doc(&doc)?;

        // -- Download --
        self.set_state(&mut doc, UpdateState::Downloading, 45, "staging packages")?;
        if let Err(e) = self.agent.call("pkg.stage", serde_json::json!({})).await {
            return Err(self.fail_run(&mut doc, Some(&tx_id), e.into())?);
        }

        if cancel.is_cancelled() {
            let e = EngineError::timeout("cancelled", "update cancelled before install");
            return Err(self.fail_run(&mut doc, Some(&tx_id), e)?);
        }

        // -- Install --
        self.set_state(&mut doc, UpdateState::Applying, 60, "upgrading packages")?;
        if let Err(e) = self.agent.call("pkg.upgrade", serde_json::json!({})).await {
            // Any non-zero exit from the upgrade verb is a failure and
            // rolls back.
            return Err(self
                .roll_back_run(&mut doc, &tx_id, &targets, e.into())
                .await?);
        }

        // -- Postflight --
        self.set_state(&mut doc, UpdateState::Verifying, 80, "verifying services")?;
        if let Err(e) = self.postflight().await {
            return Err(self
                .roll_back_run(&mut doc, &tx_id, &targets, e)
                .await?);
        }

        // -- Cleanup --
        if let Err(e) = self.agent.call("pkg.prune_cache", serde_json::json!({})).await {
            warn!("package cache prune failed: {}", e);
        }
        self.prune_update_snapshots().await;

        self.index.commit(&tx_id)?;
        doc.finished_at = Some(self.clock.now());
        self.set_state(&mut doc, UpdateState::Success, 100, "update complete")?;
        self.events.publish(Event::UpdateCompleted { tx_id: tx_id.clone() });
        info!(tx_id = %tx_id, "system update committed");
        Ok(tx_id)
    }

    /// Manually roll back a committed (or failed) update transaction.
    pub async fn rollback(&self, tx_id: &TxId) -> Result<TxId, EngineError> {
        let _lock = FileLock::try_acquire(&self.config.lock_path).map_err(|_| {
            EngineError::precondition("update_in_progress", "another update run holds the lock")
        })?;

        let tx = self
            .index
            .get(tx_id)?
            .ok_or_else(|| EngineError::not_found("transaction", tx_id.as_str()))?;
        if !matches!(tx.result, TxResult::Committed | TxResult::Failed) {
            return Err(EngineError::precondition(
                "tx_state",
                format!("transaction {tx_id} is {:?}, cannot roll back", tx.result),
            ));
        }

        let mut doc = self.status()?;
        self.set_state(&mut doc, UpdateState::RollingBack, 50, "restoring snapshots")?;

        if let Err(e) = self.restore_targets(&tx.targets).await {
            doc.reason = Some(e.to_string());
            self.set_state(&mut doc, UpdateState::Failed, 100, "rollback failed")?;
            self.events.publish(Event::UpdateFailed {
                reason: e.to_string(),
            });
            return Err(e);
        }

        let rollback_tx = TxId::new(self.id_gen.next());
        self.index.begin(Transaction::new(
            rollback_tx.clone(),
            self.clock.now(),
            TxKind::SystemUpdate,
            tx.targets.clone(),
        ))?;
        self.index.commit(&rollback_tx)?;
        self.index.mark_rolled_back(tx_id, &rollback_tx)?;

        doc.finished_at = Some(self.clock.now());
        self.set_state(&mut doc, UpdateState::RolledBack, 100, "rollback complete")?;
        self.events.publish(Event::UpdateRolledBack { tx_id: tx_id.clone() });
        info!(tx_id = %tx_id, rollback_tx = %rollback_tx, "update rolled back");
        Ok(rollback_tx)
    }

    /// Startup recovery: an interrupted run (non-idle, non-terminal) is
    /// marked failed; a partial install needs a human decision before any
    /// rollback.
    pub fn recover_interrupted(&self) -> Result<Option<UpdateState>, EngineError> {
        let mut doc = self.status()?;
        if doc.state == UpdateState::Idle || doc.state.is_terminal() {
            return Ok(None);
        }

        let interrupted_in = doc.state;
        warn!(state = %interrupted_in, "interrupted update run found at startup");

        doc.state = UpdateState::Failed;
        doc.reason = Some("interrupted".to_string());
        doc.finished_at = Some(self.clock.now());
        doc.progress = UpdateProgress {
            state: UpdateState::Failed,
            percent: 100,
            message: format!("interrupted during {interrupted_in}"),
        };
        self.save_doc(&doc)?;

        if let Some(tx_id) = &doc.tx_id {
            if let Err(e) = self.index.fail(tx_id, "interrupted") {
                warn!(tx_id = %tx_id, "marking interrupted transaction failed: {}", e);
            }
        }

        self.events.publish(Event::UpdateFailed {
            reason: "interrupted".to_string(),
        });
        Ok(Some(interrupted_in))
    }

    // ---- phases ----

    async fn preflight(&self) -> Result<(), EngineError> {
        for target in &self.config.targets {
            let available = fs2::available_space(&target.path)
                .map_err(|e| EngineError::io("preflight_disk", e))?;
            if available < self.config.disk_floor_bytes {
                return Err(EngineError::precondition(
                    "preflight_disk",
                    format!(
                        "{} has {} bytes free, below the {} floor",
                        target.path.display(),
                        available,
                        self.config.disk_floor_bytes
                    ),
                ));
            }
        }

        self.agent.call("pkg.refresh", serde_json::json!({})).await?;
        self.agent.call("pkg.verify_keys", serde_json::json!({})).await?;
        Ok(())
    }

    async fn snapshot_targets(&self) -> Result<Vec<TxTarget>, EngineError> {
        let mut targets = Vec::new();
        for config in &self.config.targets {
            for unit in &config.stop_services {
                self.agent
                    .call("service.stop", serde_json::json!({ "unit": unit }))
                    .await?;
            }

            let result = self
                .snapshots
                .create(&self.snapshot_target(config).await?, "pre-update")
                .await;

            // Stopped services come back whether or not the snapshot
            // landed.
            for unit in &config.stop_services {
                if let Err(e) = self
                    .agent
                    .call("service.start", serde_json::json!({ "unit": unit }))
                    .await
                {
                    warn!(unit, "restarting service after snapshot: {}", e);
                }
            }

            let snapshot = result?;
            self.events.publish(Event::SnapshotCreated {
                target: config.id.clone(),
                snapshot_id: snapshot.id.clone(),
                kind: snapshot.kind,
                tag: "pre-update".to_string(),
            });
            targets.push(TxTarget {
                target_id: config.id.clone(),
                path: config.path.clone(),
                snapshot: Some(snapshot),
            });
        }
        Ok(targets)
    }

    /// Resolve a configured target into a concrete snapshot target:
    /// CoW snapshots live under `<path>/.snapshots`, tar snapshots under
    /// `<snapshot_root>/<slug(path)>`.
    async fn snapshot_target(&self, config: &UpdateTargetConfig) -> Result<SnapshotTarget, EngineError> {
        let cow = match config.mode {
            SnapshotMode::Cow => true,
            SnapshotMode::Tar => false,
            SnapshotMode::Auto => self.snapshots.is_cow(&config.path).await?,
        };
        let (mode, snapshot_dir) = if cow {
            (SnapshotMode::Cow, config.path.join(".snapshots"))
        } else {
            (
                SnapshotMode::Tar,
                self.config.snapshot_root.join(slugify(&config.path)),
            )
        };
        Ok(SnapshotTarget {
            id: config.id.clone(),
            path: config.path.clone(),
            mode,
            snapshot_dir,
        })
    }

    async fn postflight(&self) -> Result<(), EngineError> {
        for unit in &self.config.critical_services {
            self.agent
                .call("service.is_active", serde_json::json!({ "unit": unit }))
                .await
                .map_err(|e| {
                    EngineError::external(
                        "postflight_service",
                        format!("critical service {unit} is not active: {e}"),
                    )
                })?;
        }

        if let Some(url) = &self.config.health_url {
            let response = reqwest::Client::new()
                .get(url)
                .timeout(Duration::from_secs(5))
                .send()
                .await
                .map_err(|e| {
                    EngineError::external("postflight_health", format!("UI health probe: {e}"))
                })?;
            if !response.status().is_success() {
                return Err(EngineError::external(
                    "postflight_health",
                    format!("UI health endpoint returned {}", response.status()),
                ));
            }
        }
        Ok(())
    }

    async fn restore_targets(&self, targets: &[TxTarget]) -> Result<(), EngineError> {
        for target in targets {
            let Some(snapshot) = &target.snapshot else {
                continue;
            };
            let stop_services = self
                .config
                .targets
                .iter()
                .find(|t| t.id == target.target_id)
                .map(|t| t.stop_services.clone())
                .unwrap_or_default();

            for unit in &stop_services {
                if let Err(e) = self
                    .agent
                    .call("service.stop", serde_json::json!({ "unit": unit }))
                    .await
                {
                    warn!(unit, "stopping service before restore: {}", e);
                }
            }

            let result = self.snapshots.restore(&target.path, snapshot).await;

            for unit in &stop_services {
                if let Err(e) = self
                    .agent
                    .call("service.start", serde_json::json!({ "unit": unit }))
                    .await
                {
                    warn!(unit, "restarting service after restore: {}", e);
                }
            }

            result?;
        }
        Ok(())
    }

    /// Mark the run failed without touching the targets.
    fn fail_run(
        &self,
        doc: &mut UpdateStateDoc,
        tx_id: Option<&TxId>,
        error: EngineError,
    ) -> Result<EngineError, EngineError> {
        doc.reason = Some(error.to_string());
        doc.finished_at = Some(self.clock.now());
        self.set_state(doc, UpdateState::Failed, 100, "update failed")?;
        if let Some(tx_id) = tx_id {
            if let Err(e) = self.index.fail(tx_id, error.to_string()) {
                warn!(tx_id = %tx_id, "marking transaction failed: {}", e);
            }
        }
        self.events.publish(Event::UpdateFailed {
            reason: error.to_string(),
        });
        Ok(error)
    }

    /// Auto-rollback path for install/postflight failures.
    async fn roll_back_run(
        &self,
        doc: &mut UpdateStateDoc,
        tx_id: &TxId,
        targets: &[TxTarget],
        error: EngineError,
    ) -> Result<EngineError, EngineError> {
        warn!("update failed, rolling back targets: {}", error);
        self.set_state(doc, UpdateState::RollingBack, 90, "restoring snapshots")?;
        if let Err(e) = self.index.fail(tx_id, error.to_string()) {
            warn!(tx_id = %tx_id, "marking transaction failed: {}", e);
        }

        match self.restore_targets(targets).await {
            Ok(()) => {
                let rollback_tx = TxId::new(self.id_gen.next());
                self.index.begin(Transaction::new(
                    rollback_tx.clone(),
                    self.clock.now(),
                    TxKind::SystemUpdate,
                    targets.to_vec(),
                ))?;
                self.index.commit(&rollback_tx)?;
                self.index.mark_rolled_back(tx_id, &rollback_tx)?;

                doc.reason = Some(error.to_string());
                doc.finished_at = Some(self.clock.now());
                self.set_state(doc, UpdateState::RolledBack, 100, "rolled back")?;
                self.events.publish(Event::UpdateRolledBack { tx_id: tx_id.clone() });
            }
            Err(rollback_err) => {
                // Human intervention required; snapshots stay on disk.
                doc.reason = Some(format!("{error}; rollback failed: {rollback_err}"));
                doc.finished_at = Some(self.clock.now());
                self.set_state(doc, UpdateState::Failed, 100, "rollback failed")?;
                self.events.publish(Event::UpdateFailed {
                    reason: doc.reason.clone().unwrap_or_default(),
                });
            }
        }
        Ok(error)
    }

    /// Retention for update snapshots, per target. Best-effort.
    async fn prune_update_snapshots(&self) {
        for config in &self.config.targets {
            let target = match self.snapshot_target(config).await {
                Ok(target) => target,
                Err(e) => {
                    warn!(target = %config.id, "resolving snapshot target: {}", e);
                    continue;
                }
            };
            let snapshots = match self.snapshots.list(&target) {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    warn!(target = %config.id, "listing snapshots: {}", e);
                    continue;
                }
            };
            match self
                .snapshots
                .prune(&snapshots, self.config.keep_snapshots)
                .await
            {
                Ok(outcome) => {
                    for pruned in outcome.deleted {
                        self.events.publish(Event::SnapshotPruned {
                            target: config.id.clone(),
                            snapshot_id: pruned,
                        });
                    }
                }
                Err(e) => warn!(target = %config.id, "pruning snapshots: {}", e),
            }
        }
    }
}

#[cfg(test)]
#[path = "../update_tests.rs"]
mod tests;
