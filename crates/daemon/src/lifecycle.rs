// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, background scheduling, shutdown.
//!
//! Startup builds one explicit [`Core`] value from configuration and
//! hands it to the HTTP layer and scheduler — no global singletons
//! beyond the process-wide metrics counters.

use crate::config::Config;
use crate::events::EventBus;
use crate::jobs::JobRegistry;
use nos_agent::{AgentClient, UnixAgentClient};
use nos_catalog::{CatalogResolver, HttpFetcher, SyncReport};
use nos_core::{Clock, Event, SystemClock, TimerId};
use nos_engine::update::UpdateConfig;
use nos_engine::{
    AppManager, AppManagerConfig, EngineError, FirewallConfig, FirewallController, Scheduler,
    SnapshotService, StaticMfaPolicy, UpdateEngine,
};
use nos_store::{FileLock, StoreError, TxIndex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors that can abort daemon startup.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("another nosd instance is running: {0}")]
    LockFailed(StoreError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("catalog error: {0}")]
    Catalog(#[from] nos_catalog::CatalogError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything the daemon's request handlers and background tasks need.
pub struct Core {
    pub config: Config,
    pub bus: EventBus,
    pub resolver: Arc<CatalogResolver>,
    pub apps: Arc<AppManager>,
    pub updates: Arc<UpdateEngine>,
    pub firewall: Arc<FirewallController>,
    pub index: TxIndex,
    pub jobs: JobRegistry,
    pub start_time: Instant,
    // NOTE(lifetime): held to maintain the exclusive daemon lock
    #[allow(dead_code)]
    daemon_lock: FileLock,
}

/// Build the core from configuration and run startup recovery.
pub async fn startup(config: Config) -> Result<Arc<Core>, LifecycleError> {
    let agent: Arc<dyn AgentClient> = Arc::new(UnixAgentClient::new(
        &config.agent_socket,
        &config.agent_token,
    ));
    startup_with(config, agent, Box::new(HttpFetcher::new())).await
}

/// [`startup`] with the external seams injected (tests use a fake agent
/// and a scripted fetcher).
pub async fn startup_with(
    config: Config,
    agent: Arc<dyn AgentClient>,
    fetcher: Box<dyn nos_catalog::SourceFetcher>,
) -> Result<Arc<Core>, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.apps_state_dir)?;
    std::fs::create_dir_all(&config.snapshots_dir)?;

    let daemon_lock = match FileLock::try_acquire(&config.daemon_lock_path()) {
        Ok(lock) => lock,
        Err(e @ StoreError::LockHeld { .. }) => return Err(LifecycleError::LockFailed(e)),
        Err(e) => return Err(LifecycleError::Store(e)),
    };

    let bus = EventBus::new(config.events_journal_path());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let index = TxIndex::new(config.tx_index_path());

    let resolver = Arc::new(CatalogResolver::new(
        config.catalog_sources.clone(),
        config.catalog_cache_path(),
        fetcher,
    )?);

    let snapshots = Arc::new(SnapshotService::new(
        Arc::clone(&agent),
        index.clone(),
        Arc::clone(&clock),
    ));

    let events: Arc<dyn nos_engine::EventSink> = Arc::new(bus.clone());

    let apps = Arc::new(AppManager::new(
        AppManagerConfig {
            registry_path: config.registry_path(),
            apps_root: config.apps_root.clone(),
            snapshots_dir: config.app_snapshots_dir(),
            proxy_snippet_dir: config.proxy_snippet_dir.clone(),
            keep_snapshots: config.apps_keep_snapshots,
        },
        Arc::clone(&resolver),
        Arc::clone(&snapshots),
        Arc::clone(&agent),
        index.clone(),
        Arc::clone(&clock),
        Arc::clone(&events),
    ));

    let updates = Arc::new(UpdateEngine::new(
        UpdateConfig {
            state_path: config.update_state_path(),
            lock_path: config.update_lock_path(),
            snapshot_root: config.snapshots_dir.clone(),
            targets: config.update_targets.clone(),
            disk_floor_bytes: config.disk_floor_bytes,
            critical_services: config.critical_services.clone(),
            health_url: config.update_health_url.clone(),
            keep_snapshots: config.updates_keep_snapshots,
        },
        Arc::clone(&agent),
        Arc::clone(&snapshots),
        index.clone(),
        Arc::clone(&clock),
        Arc::clone(&events),
    ));

    let firewall = Arc::new(FirewallController::new(
        FirewallConfig {
            state_path: config.firewall_state_path(),
            ruleset_path: config.ruleset_path.clone(),
            options: config.firewall_options.clone(),
            confirm_requires_mfa: config.confirm_requires_mfa,
        },
        Arc::clone(&agent),
        Arc::clone(&clock),
        Arc::clone(&events),
        Arc::new(StaticMfaPolicy(config.mfa_enrolled)),
    )?);

    // Startup recovery: an update run cut short by the previous daemon
    // becomes failed/interrupted; a pending firewall confirm re-arms
    // with the remaining window.
    match updates.recover_interrupted() {
        Ok(Some(state)) => warn!(%state, "marked interrupted update run failed"),
        Ok(None) => {}
        Err(e) => error!("update recovery failed: {}", e),
    }
    firewall.rearm_on_startup();

    let core = Arc::new(Core {
        config,
        bus,
        resolver,
        apps,
        updates,
        firewall,
        index,
        jobs: JobRegistry::new(),
        start_time: Instant::now(),
        daemon_lock,
    });

    // Background reconciliation: align registry status with the runtime
    // without blocking startup.
    {
        let apps = Arc::clone(&core.apps);
        tokio::spawn(async move {
            if let Err(e) = apps.reconcile().await {
                warn!("app reconciliation failed: {}", e);
            } else {
                info!("app reconciliation complete");
            }
        });
    }

    Ok(core)
}

impl Core {
    /// Sync remote catalog sources and surface the per-source outcomes
    /// as events.
    pub async fn sync_catalog(&self) -> Result<SyncReport, EngineError> {
        let report = self
            .resolver
            .sync()
            .await
            .map_err(|e| EngineError::external("catalog_sync", e.to_string()))?;

        for (source, reason) in &report.rejected {
            self.bus.publish_as(
                "system",
                Event::CatalogSourceRejected {
                    source: source.clone(),
                    reason: reason.clone(),
                },
            );
        }
        self.bus.publish_as(
            "system",
            Event::CatalogRefreshed {
                sources: report.sources_ok,
                entries: report.entries,
            },
        );
        Ok(report)
    }
}

/// Scheduler tick resolution.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Retention prune cadence.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Run the in-process scheduler: periodic catalog refresh and snapshot
/// retention pruning. Returns only when the daemon shuts down.
pub async fn run_scheduler(core: Arc<Core>, shutdown: Arc<tokio::sync::Notify>) {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();
    scheduler.set_periodic(
        TimerId::catalog_refresh(),
        Duration::from_secs(core.config.catalog_refresh_interval_secs.max(30)),
        now,
    );
    scheduler.set_periodic(TimerId::retention_prune(), PRUNE_INTERVAL, now);

    let mut tick = tokio::time::interval(TICK_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                for timer in scheduler.fired_timers(Instant::now()) {
                    fire_timer(&core, &timer).await;
                }
            }
            _ = shutdown.notified() => {
                info!("scheduler stopping");
                return;
            }
        }
    }
}

async fn fire_timer(core: &Arc<Core>, timer: &TimerId) {
    if *timer == TimerId::catalog_refresh() {
        if let Err(e) = core.sync_catalog().await {
            warn!("scheduled catalog refresh failed: {}", e);
        }
    } else if *timer == TimerId::retention_prune() {
        if let Err(e) = core.apps.prune_snapshots().await {
            warn!("scheduled snapshot prune failed: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
