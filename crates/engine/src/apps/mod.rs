// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App lifecycle engine: keeps the installed-app registry and the real
//! container state in agreement, with snapshot-before-mutation and
//! automatic rollback on health failure.
//!
//! Per-app operations are serialized by a per-id mutex; the registry
//! itself is only touched under a short-held lock. The registry record is
//! written only on commit — a failed operation leaves either the previous
//! record or an `error`-status record, never a half-updated one.

mod paths;
mod steps;

pub use paths::AppPaths;

use crate::error::EngineError;
use crate::events::EventSink;
use crate::fsutil::write_text_atomic;
use crate::health::HealthWaiter;
use crate::snapshots::{SnapshotMode, SnapshotService, SnapshotTarget};
use crate::txn::TwoPhase;
use nos_agent::AgentClient;
use nos_catalog::{render_app, validate_params, CatalogResolver, RenderContext, RenderedApp};
use nos_core::{
    AppRegistry, AppStatus, CancelToken, CatalogEntry, Clock, Event, HealthObservation, IdGen,
    InstalledApp, SnapshotId, Transaction, TxId, TxKind, TxTarget, UuidIdGen,
};
use nos_store::TxIndex;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Filesystem and policy configuration for the app engine.
#[derive(Debug, Clone)]
pub struct AppManagerConfig {
    /// Registry document (`apps.json`).
    pub registry_path: PathBuf,
    /// Per-app trees root (`/srv/apps`).
    pub apps_root: PathBuf,
    /// App snapshot root (`/srv/apps/.snapshots`).
    pub snapshots_dir: PathBuf,
    /// Where reverse-proxy snippets are written.
    pub proxy_snippet_dir: PathBuf,
    /// Newest-N retention for app snapshots.
    pub keep_snapshots: usize,
}

/// The app lifecycle engine.
pub struct AppManager {
    config: AppManagerConfig,
    resolver: Arc<CatalogResolver>,
    snapshots: Arc<SnapshotService>,
    agent: Arc<dyn AgentClient>,
    health: HealthWaiter,
    index: TxIndex,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    id_gen: UuidIdGen,
    /// Per-app mutexes; the registry map lock is short-held only.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AppManagerConfig,
        resolver: Arc<CatalogResolver>,
        snapshots: Arc<SnapshotService>,
        agent: Arc<dyn AgentClient>,
        index: TxIndex,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let health = HealthWaiter::new(Arc::clone(&agent), Arc::clone(&clock));
        Self {
            config,
            resolver,
            snapshots,
            agent,
            health,
            index,
            clock,
            events,
            id_gen: UuidIdGen,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn entity_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(
            locks
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    fn paths(&self, id: &str) -> AppPaths {
        AppPaths::new(&self.config.apps_root, &self.config.snapshots_dir, id)
    }

    fn snapshot_target(&self, id: &str) -> SnapshotTarget {
        let paths = self.paths(id);
        SnapshotTarget {
            id: id.to_string(),
            path: paths.data_dir,
            mode: SnapshotMode::Auto,
            snapshot_dir: paths.snapshot_dir,
        }
    }

    fn load_registry(&self) -> Result<AppRegistry, EngineError> {
        Ok(nos_store::load_json(&self.config.registry_path)?.unwrap_or_default())
    }

    fn save_registry(&self, registry: &AppRegistry) -> Result<(), EngineError> {
        nos_store::save_json(&self.config.registry_path, registry)?;
        Ok(())
    }

    /// Flip an app's status through the state machine and persist.
    fn persist_status(
        &self,
        registry: &mut AppRegistry,
        id: &str,
        next: AppStatus,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        let app = registry
            .apps
            .get_mut(id)
            .ok_or_else(|| EngineError::not_found("app", id))?;
        if !app.status.can_transition(next) {
            return Err(EngineError::precondition(
                "invalid_state",
                format!("app {id} is {}, cannot become {next}", app.status),
            ));
        }
        app.status = next;
        app.error = error;
        app.updated_at = self.clock.now();
        self.save_registry(registry)
    }

    pub fn get(&self, id: &str) -> Result<Option<InstalledApp>, EngineError> {
        Ok(self.load_registry()?.apps.get(id).cloned())
    }

    pub fn list(&self) -> Result<Vec<InstalledApp>, EngineError> {
        Ok(self.load_registry()?.apps.into_values().collect())
    }

    /// Install an app from the catalog.
    ///
    /// Validation (entry exists, params pass schema) happens before any
    /// file is created; a validation failure leaves no trace.
    pub async fn install(
        &self,
        id: &str,
        params: BTreeMap<String, serde_json::Value>,
        cancel: &CancelToken,
    ) -> Result<InstalledApp, EngineError> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;

        let mut registry = self.load_registry()?;
        if registry.apps.contains_key(id) {
            return Err(EngineError::precondition(
                "already_installed",
                format!("app already installed: {id}"),
            ));
        }

        let entry = self
            .resolver
            .entry(id)
            .ok_or_else(|| EngineError::not_found("app", id))?;
        validate_params(&entry, &params)?;

        let paths = self.paths(id);
        let rendered = self.render(&entry, &params, &paths)?;

        self.events.publish(Event::AppInstallStarted { id: id.to_string() });

        let result = self
            .install_inner(id, &entry, &params, &paths, &rendered, &mut registry, cancel)
            .await;

        match result {
            Ok(app) => {
                self.events.publish(Event::AppInstallCompleted {
                    id: id.to_string(),
                    version: app.version.clone(),
                });
                Ok(app)
            }
            Err(e) => {
                self.events.publish(Event::AppInstallFailed {
                    id: id.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn install_inner(
        &self,
        id: &str,
        entry: &CatalogEntry,
        params: &BTreeMap<String, serde_json::Value>,
        paths: &AppPaths,
        rendered: &RenderedApp,
        registry: &mut AppRegistry,
        cancel: &CancelToken,
    ) -> Result<InstalledApp, EngineError> {
        // Tree: config dir plain, data dir a subvolume when the root is CoW.
        fs::create_dir_all(&paths.config_dir).map_err(|e| EngineError::io("app_tree", e))?;
        if !paths.data_dir.exists() {
            if self.snapshots.is_cow(&self.config.apps_root).await? {
                self.agent
                    .call(
                        "fs.subvolume.create",
                        serde_json::json!({ "path": paths.data_dir.display().to_string() }),
                    )
                    .await?;
            } else {
                fs::create_dir_all(&paths.data_dir).map_err(|e| EngineError::io("app_tree", e))?;
            }
        }

        write_text_atomic(&paths.compose_path, &rendered.compose_yaml)?;
        write_text_atomic(&paths.env_path, &rendered.env_file)?;

        let snapshot = self
            .snapshots
            .create(&self.snapshot_target(id), "post-install")
            .await?;

        let tx_id = TxId::new(self.id_gen.next());
        self.index.begin(Transaction::new(
            tx_id.clone(),
            self.clock.now(),
            TxKind::AppInstall,
            vec![TxTarget {
                target_id: id.to_string(),
                path: paths.data_dir.clone(),
                snapshot: Some(snapshot.clone()),
            }],
        ))?;

        let started = self.compose_up(id, paths).await;
        let health_ok = match started {
            Ok(()) => {
                self.wait_app_healthy(id, entry, rendered, cancel).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = health_ok {
            // Start or health failed: stop the unit, keep the tree for
            // inspection, record the failed transaction.
            let _ = self.compose_down(id, paths).await;
            if let Err(idx_err) = self.index.fail(&tx_id, e.to_string()) {
                warn!(app = id, "marking install transaction failed: {}", idx_err);
            }
            return Err(e);
        }

        self.write_proxy_snippet(id, rendered).await?;

        let now = self.clock.now();
        let app = InstalledApp {
            id: id.to_string(),
            version: entry.version.clone(),
            status: AppStatus::Running,
            params: params.clone(),
            params_digest: params_digest(&entry.version, params),
            ports: rendered.ports.clone(),
            urls: rendered.urls.clone(),
            health: Some(HealthObservation {
                healthy: true,
                observed_at: now,
                detail: None,
            }),
            installed_at: now,
            updated_at: now,
            snapshots: vec![snapshot],
            error: None,
        };
        registry.apps.insert(id.to_string(), app.clone());
        self.save_registry(registry)?;
        self.index.commit(&tx_id)?;

        info!(app = id, version = %app.version, "installed");
        Ok(app)
    }

    /// Upgrade an installed app to a new version and/or parameters.
    ///
    /// Idempotent: the same version+params digest as the running app is a
    /// no-op. Parameter validation precedes the pre-upgrade snapshot; on
    /// start or health failure the app is restored from the backup files
    /// and snapshot, restarted on the originating version, and marked
    /// `error`.
    pub async fn upgrade(
        &self,
        id: &str,
        new_version: &str,
        params: Option<BTreeMap<String, serde_json::Value>>,
        cancel: &CancelToken,
    ) -> Result<InstalledApp, EngineError> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;

        let mut registry = self.load_registry()?;
        let app = registry
            .apps
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::precondition("not_installed", format!("app not installed: {id}")))?;

        let entry = self
            .resolver
            .entry(id)
            .ok_or_else(|| EngineError::not_found("app", id))?;

        let params = params.unwrap_or_else(|| app.params.clone());
        // Validation precedes the snapshot: a bad parameter leaves the
        // installed app untouched.
        validate_params(&entry, &params)?;

        let digest = params_digest(new_version, &params);
        if digest == app.params_digest && app.status == AppStatus::Running {
            return Ok(app);
        }

        if !app.status.can_transition(AppStatus::Upgrading) {
            return Err(EngineError::precondition(
                "invalid_state",
                format!("app {id} is {}, cannot upgrade", app.status),
            ));
        }

        self.persist_status(&mut registry, id, AppStatus::Upgrading, None)?;
        self.events.publish(Event::AppUpgradeStarted {
            id: id.to_string(),
            from_version: app.version.clone(),
            to_version: new_version.to_string(),
        });

        let result = self
            .upgrade_inner(id, &entry, new_version, &params, digest, &app, &mut registry, cancel)
            .await;

        match result {
            Ok(app) => {
                self.events.publish(Event::AppUpgradeCompleted {
                    id: id.to_string(),
                    version: app.version.clone(),
                });
                Ok(app)
            }
            Err(e) => {
                self.events.publish(Event::AppUpgradeFailed {
                    id: id.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upgrade_inner(
        &self,
        id: &str,
        entry: &CatalogEntry,
        new_version: &str,
        params: &BTreeMap<String, serde_json::Value>,
        digest: String,
        previous: &InstalledApp,
        registry: &mut AppRegistry,
        cancel: &CancelToken,
    ) -> Result<InstalledApp, EngineError> {
        let paths = self.paths(id);

        let snapshot = match self.snapshots.create(&self.snapshot_target(id), "pre-upgrade").await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Nothing mutated yet: back to the previous status.
                self.persist_status(registry, id, previous.status, Some(e.to_string()))?;
                return Err(e);
            }
        };

        let tx_id = TxId::new(self.id_gen.next());
        self.index.begin(Transaction::new(
            tx_id.clone(),
            self.clock.now(),
            TxKind::AppUpgrade,
            vec![TxTarget {
                target_id: id.to_string(),
                path: paths.data_dir.clone(),
                snapshot: Some(snapshot.clone()),
            }],
        ))?;

        // Render-before-mutate: the new files land atomically, the live
        // ones survive as .backup siblings until commit. The two-phase
        // orchestrator guarantees exactly one of commit or rollback runs
        // per prepared step, with rollback restoring files before the
        // data snapshot and restarting last.
        let rendered = match self.render(entry, params, &paths) {
            Ok(rendered) => rendered,
            Err(e) => {
                self.persist_status(registry, id, AppStatus::Error, Some(e.to_string()))?;
                let _ = self.index.fail(&tx_id, e.to_string());
                return Err(e);
            }
        };

        let mut phases = TwoPhase::new();
        phases.push(Box::new(steps::DataStep {
            snapshots: Arc::clone(&self.snapshots),
            agent: Arc::clone(&self.agent),
            paths: paths.clone(),
            snapshot: snapshot.clone(),
        }));
        phases.push(Box::new(steps::FilesStep {
            paths: paths.clone(),
            new_compose: rendered.compose_yaml.clone(),
            new_env: rendered.env_file.clone(),
        }));
        phases.push(Box::new(steps::RuntimeStep {
            agent: Arc::clone(&self.agent),
            health: HealthWaiter::new(Arc::clone(&self.agent), Arc::clone(&self.clock)),
            paths: paths.clone(),
            spec: entry.health.clone().unwrap_or_default(),
            http_port: rendered.ports.first().map(|p| p.host),
            cancel: cancel.clone(),
        }));

        match phases.run().await {
            Ok(()) => {
                let mut snapshots = previous.snapshots.clone();
                snapshots.push(snapshot);
                // Retention is best-effort once the upgrade is committed.
                let outcome = match self
                    .snapshots
                    .prune(&snapshots, self.config.keep_snapshots)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(app = id, "snapshot prune failed: {}", e);
                        crate::snapshots::PruneOutcome {
                            kept: snapshots,
                            deleted: Vec::new(),
                        }
                    }
                };
                for pruned in &outcome.deleted {
                    self.events.publish(Event::SnapshotPruned {
                        target: id.to_string(),
                        snapshot_id: pruned.clone(),
                    });
                }

                self.write_proxy_snippet(id, &rendered).await?;

                let now = self.clock.now();
                let app = InstalledApp {
                    id: id.to_string(),
                    version: new_version.to_string(),
                    status: AppStatus::Running,
                    params: params.clone(),
                    params_digest: digest,
                    ports: rendered.ports.clone(),
                    urls: rendered.urls.clone(),
                    health: Some(HealthObservation {
                        healthy: true,
                        observed_at: now,
                        detail: None,
                    }),
                    installed_at: previous.installed_at,
                    updated_at: now,
                    snapshots: outcome.kept,
                    error: None,
                };
                registry.apps.insert(id.to_string(), app.clone());
                self.save_registry(registry)?;
                self.index.commit(&tx_id)?;

                info!(app = id, version = new_version, "upgraded");
                Ok(app)
            }
            Err(failure) => {
                warn!(app = id, "upgrade failed, rolled back: {}", failure.error);
                let _ = self.index.fail(&tx_id, failure.error.to_string());

                if failure.rollback_failures.is_empty() {
                    // Originating version reinstated; the app is marked
                    // error with the upgrade failure.
                    self.persist_status(
                        registry,
                        id,
                        AppStatus::Error,
                        Some(failure.error.to_string()),
                    )?;
                } else {
                    // Rollback also failed: backups stay on disk for
                    // manual recovery.
                    warn!(
                        app = id,
                        steps = ?failure.rollback_failures,
                        "rollback incomplete, backups preserved"
                    );
                    self.persist_status(
                        registry,
                        id,
                        AppStatus::Error,
                        Some(format!(
                            "{}; rollback failed in: {}",
                            failure.error,
                            failure.rollback_failures.join(", ")
                        )),
                    )?;
                }
                Err(failure.error)
            }
        }
    }

    /// Start a stopped (or errored) app.
    pub async fn start(&self, id: &str) -> Result<InstalledApp, EngineError> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;

        let mut registry = self.load_registry()?;
        let app = registry
            .apps
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("app", id))?;
        if app.status == AppStatus::Running {
            return Ok(app);
        }

        self.persist_status(&mut registry, id, AppStatus::Starting, None)?;
        let paths = self.paths(id);

        match self.compose_up(id, &paths).await {
            Ok(()) => {
                self.persist_status(&mut registry, id, AppStatus::Running, None)?;
                self.events.publish(Event::AppStarted { id: id.to_string() });
                self.get(id)?.ok_or_else(|| EngineError::not_found("app", id))
            }
            Err(e) => {
                self.persist_status(&mut registry, id, AppStatus::Error, Some(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Stop a running app.
    pub async fn stop(&self, id: &str) -> Result<InstalledApp, EngineError> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;

        let mut registry = self.load_registry()?;
        let app = registry
            .apps
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("app", id))?;
        if app.status == AppStatus::Stopped {
            return Ok(app);
        }

        self.persist_status(&mut registry, id, AppStatus::Stopping, None)?;
        let paths = self.paths(id);

        match self.compose_down(id, &paths).await {
            Ok(()) => {
                self.persist_status(&mut registry, id, AppStatus::Stopped, None)?;
                self.events.publish(Event::AppStopped { id: id.to_string() });
                self.get(id)?.ok_or_else(|| EngineError::not_found("app", id))
            }
            Err(e) => {
                self.persist_status(&mut registry, id, AppStatus::Error, Some(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Restart: stop then start, through the same state machine.
    pub async fn restart(&self, id: &str) -> Result<InstalledApp, EngineError> {
        {
            let lock = self.entity_lock(id);
            let _guard = lock.lock().await;

            let mut registry = self.load_registry()?;
            let app = registry
                .apps
                .get(id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("app", id))?;
            let paths = self.paths(id);

            if app.status != AppStatus::Stopped {
                self.persist_status(&mut registry, id, AppStatus::Stopping, None)?;
                if let Err(e) = self.compose_down(id, &paths).await {
                    self.persist_status(&mut registry, id, AppStatus::Error, Some(e.to_string()))?;
                    return Err(e);
                }
                self.persist_status(&mut registry, id, AppStatus::Stopped, None)?;
            }
        }
        self.start(id).await
    }

    /// Stop, deregister, and remove an app; the data tree survives iff
    /// `keep_data`.
    pub async fn delete(&self, id: &str, keep_data: bool) -> Result<(), EngineError> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;

        let mut registry = self.load_registry()?;
        let app = registry
            .apps
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("app", id))?;
        let paths = self.paths(id);

        self.compose_down(id, &paths).await?;
        self.remove_proxy_snippet(id).await;

        if !keep_data {
            for snapshot in &app.snapshots {
                if let Err(e) = self.snapshots.delete(snapshot).await {
                    warn!(app = id, snapshot = %snapshot.id, "deleting snapshot: {}", e);
                }
            }
            let _ = fs::remove_dir_all(&paths.snapshot_dir);

            if paths.data_dir.exists() {
                let data_deleted = self
                    .agent
                    .call(
                        "fs.subvolume.delete",
                        serde_json::json!({ "path": paths.data_dir.display().to_string() }),
                    )
                    .await
                    .is_ok();
                if !data_deleted {
                    fs::remove_dir_all(&paths.data_dir)
                        .map_err(|e| EngineError::io("app_delete", e))?;
                }
            }
            fs::remove_dir_all(&paths.app_dir).map_err(|e| EngineError::io("app_delete", e))?;
        }

        registry.apps.remove(id);
        self.save_registry(&registry)?;
        self.events.publish(Event::AppDeleted {
            id: id.to_string(),
            kept_data: keep_data,
        });
        info!(app = id, keep_data, "deleted");
        Ok(())
    }

    /// Restore an app's data tree from one of its snapshots, restart, and
    /// verify health.
    pub async fn rollback(
        &self,
        id: &str,
        snapshot_id: &SnapshotId,
        cancel: &CancelToken,
    ) -> Result<InstalledApp, EngineError> {
        let lock = self.entity_lock(id);
        let _guard = lock.lock().await;

        let mut registry = self.load_registry()?;
        let app = registry
            .apps
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("app", id))?;
        let snapshot = app
            .snapshots
            .iter()
            .find(|s| &s.id == snapshot_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("snapshot", snapshot_id.as_str()))?;

        if !app.status.can_transition(AppStatus::RollingBack) {
            return Err(EngineError::precondition(
                "invalid_state",
                format!("app {id} is {}, cannot roll back", app.status),
            ));
        }

        self.persist_status(&mut registry, id, AppStatus::RollingBack, None)?;
        self.events.publish(Event::AppRollbackStarted {
            id: id.to_string(),
            snapshot_id: snapshot_id.clone(),
        });

        let paths = self.paths(id);
        let tx_id = TxId::new(self.id_gen.next());
        self.index.begin(Transaction::new(
            tx_id.clone(),
            self.clock.now(),
            TxKind::AppRollback,
            vec![TxTarget {
                target_id: id.to_string(),
                path: paths.data_dir.clone(),
                snapshot: Some(snapshot.clone()),
            }],
        ))?;

        let entry = self.resolver.entry(id);
        let run = async {
            self.compose_down(id, &paths).await?;
            self.snapshots.restore(&paths.data_dir, &snapshot).await?;
            self.compose_up(id, &paths).await?;
            if let Some(entry) = &entry {
                let spec = entry.health.clone().unwrap_or_default();
                let port = app.ports.first().map(|p| p.host);
                self.health
                    .wait_healthy(&paths.project, &spec, port, cancel)
                    .await?;
            }
            Ok::<(), EngineError>(())
        };

        match run.await {
            Ok(()) => {
                self.persist_status(&mut registry, id, AppStatus::Running, None)?;
                self.index.commit(&tx_id)?;
                self.events
                    .publish(Event::AppRollbackCompleted { id: id.to_string() });
                self.get(id)?.ok_or_else(|| EngineError::not_found("app", id))
            }
            Err(e) => {
                self.persist_status(&mut registry, id, AppStatus::Error, Some(e.to_string()))?;
                let _ = self.index.fail(&tx_id, e.to_string());
                self.events.publish(Event::AppRollbackFailed {
                    id: id.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Align registry status with observed container state.
    ///
    /// Run at daemon startup: an app the runtime no longer reports moves
    /// to `stopped`; a partially-running one to `unknown`. Busy apps
    /// (mid-mutation statuses) are left alone.
    pub async fn reconcile(&self) -> Result<(), EngineError> {
        let mut registry = self.load_registry()?;
        let mut changed = false;

        for (id, app) in registry.apps.iter_mut() {
            if app.status.is_busy() {
                continue;
            }
            let paths = AppPaths::new(&self.config.apps_root, &self.config.snapshots_dir, id);
            let states = match self.health.observe(&paths.project).await {
                Ok(states) => states,
                Err(e) => {
                    warn!(app = %id, "reconcile observe failed: {}", e);
                    continue;
                }
            };

            let observed = if states.is_empty() {
                AppStatus::Stopped
            } else if states.iter().all(|s| s.is_running()) {
                AppStatus::Running
            } else {
                AppStatus::Unknown
            };

            let now = self.clock.now();
            let healthy = !states.is_empty() && states.iter().all(|s| s.is_healthy());
            if app.health.as_ref().map(|h| h.healthy) != Some(healthy) {
                self.events.publish(Event::AppHealthChanged {
                    id: id.clone(),
                    healthy,
                });
                app.health = Some(HealthObservation {
                    healthy,
                    observed_at: now,
                    detail: None,
                });
                changed = true;
            }

            if app.status != observed && app.status != AppStatus::Error {
                info!(app = %id, from = %app.status, to = %observed, "reconciled status");
                app.status = observed;
                app.updated_at = now;
                changed = true;
            }
        }

        if changed {
            self.save_registry(&registry)?;
        }
        Ok(())
    }

    /// Retention pass over every installed app's snapshots.
    ///
    /// Run from the scheduler tick; the per-upgrade prune already keeps
    /// steady state, this catches snapshots orphaned by crashes.
    pub async fn prune_snapshots(&self) -> Result<(), EngineError> {
        let ids: Vec<String> = self.load_registry()?.apps.keys().cloned().collect();
        for id in ids {
            let lock = self.entity_lock(&id);
            let _guard = lock.lock().await;

            let mut registry = self.load_registry()?;
            let Some(app) = registry.apps.get(&id).cloned() else {
                continue;
            };
            let outcome = self
                .snapshots
                .prune(&app.snapshots, self.config.keep_snapshots)
                .await?;
            if outcome.deleted.is_empty() {
                continue;
            }
            for pruned in &outcome.deleted {
                self.events.publish(Event::SnapshotPruned {
                    target: id.clone(),
                    snapshot_id: pruned.clone(),
                });
            }
            if let Some(app) = registry.apps.get_mut(&id) {
                app.snapshots = outcome.kept;
            }
            self.save_registry(&registry)?;
        }
        Ok(())
    }

    // ---- shared helpers ----

    fn render(
        &self,
        entry: &CatalogEntry,
        params: &BTreeMap<String, serde_json::Value>,
        paths: &AppPaths,
    ) -> Result<RenderedApp, EngineError> {
        let ctx = RenderContext {
            app_id: entry.id.clone(),
            config_dir: paths.config_dir.clone(),
            data_dir: paths.data_dir.clone(),
        };
        render_app(entry, params, &ctx)
            .map_err(|e| EngineError::validation("render", e.to_string()))
    }

    async fn compose_up(&self, _id: &str, paths: &AppPaths) -> Result<(), EngineError> {
        self.agent
            .call(
                "container.compose.up",
                serde_json::json!({
                    "compose_file": paths.compose_path.display().to_string(),
                    "project": paths.project.clone(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn compose_down(&self, _id: &str, paths: &AppPaths) -> Result<(), EngineError> {
        self.agent
            .call(
                "container.compose.down",
                serde_json::json!({
                    "compose_file": paths.compose_path.display().to_string(),
                    "project": paths.project.clone(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn wait_app_healthy(
        &self,
        id: &str,
        entry: &CatalogEntry,
        rendered: &RenderedApp,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        let spec = entry.health.clone().unwrap_or_default();
        let port = rendered.ports.first().map(|p| p.host);
        self.health
            .wait_healthy(&self.paths(id).project, &spec, port, cancel)
            .await
    }

    async fn write_proxy_snippet(&self, id: &str, rendered: &RenderedApp) -> Result<(), EngineError> {
        let Some(snippet) = &rendered.proxy_snippet else {
            return Ok(());
        };
        let path = self.config.proxy_snippet_dir.join(&rendered.proxy_snippet_name);
        write_text_atomic(&path, snippet)?;
        if let Err(e) = self.agent.call("proxy.reload", serde_json::json!({})).await {
            warn!(app = id, "proxy reload failed: {}", e);
        }
        Ok(())
    }

    async fn remove_proxy_snippet(&self, id: &str) {
        let path = self.config.proxy_snippet_dir.join(format!("app-{id}"));
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(app = id, "removing proxy snippet: {}", e);
                return;
            }
            if let Err(e) = self.agent.call("proxy.reload", serde_json::json!({})).await {
                warn!(app = id, "proxy reload failed: {}", e);
            }
        }
    }
}

/// sha256 hex over version + canonical params JSON.
///
/// `BTreeMap` keys serialize in sorted order, so the digest is stable
/// across callers.
pub fn params_digest(version: &str, params: &BTreeMap<String, serde_json::Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(version.as_bytes());
    hasher.update(b"\0");
    if let Ok(canonical) = serde_json::to_vec(params) {
        hasher.update(&canonical);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
#[path = "../apps_tests/mod.rs"]
mod tests;
