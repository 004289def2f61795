// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Firewall / remote-access controller: plan → apply → confirm-or-auto-
//! rollback.
//!
//! Apply snapshots the live ruleset to a backup file, loads the new one,
//! and arms a confirm timer. A confirm from a reachable client proves the
//! administrator is not locked out; absent that, the timer restores the
//! backup. Pending state is persisted, so a daemon restart re-arms the
//! timer with the remaining time.

mod rules;

pub use rules::{render_nft, ruleset_for_mode, FirewallOptions};

use crate::error::EngineError;
use crate::events::EventSink;
use crate::fsutil::{backup_path, write_text_atomic};
use nos_core::firewall::FIREWALL_DOC_VERSION;
use nos_agent::AgentClient;
use nos_core::{
    compute_diff, Clock, Event, FirewallMode, FirewallPlan, FirewallState, FirewallStatus,
    IdGen, Identity, PendingApply, PlanId, UuidIdGen,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Plans expire five minutes after creation.
pub const PLAN_TTL_SECS: i64 = 5 * 60;

/// Default confirm window after a successful apply.
pub const DEFAULT_ROLLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Whether any admin has MFA enrolled — consulted before entering modes
/// that expose the API beyond the LAN.
pub trait MfaPolicy: Send + Sync {
    fn admin_mfa_enrolled(&self) -> bool;
}

/// Fixed-answer policy, configured at startup.
#[derive(Debug, Clone, Copy)]
pub struct StaticMfaPolicy(pub bool);

impl MfaPolicy for StaticMfaPolicy {
    fn admin_mfa_enrolled(&self) -> bool {
        self.0
    }
}

/// Firewall controller configuration.
#[derive(Debug, Clone)]
pub struct FirewallConfig {
    /// Persisted controller state.
    pub state_path: PathBuf,
    /// Live nftables script loaded by the agent.
    pub ruleset_path: PathBuf,
    pub options: FirewallOptions,
    /// When true, confirming a plan into direct/tunnel requires a fresh
    /// MFA-verified identity.
    pub confirm_requires_mfa: bool,
}

struct Inner {
    state: FirewallState,
    plans: HashMap<PlanId, FirewallPlan>,
    confirm_timer: Option<JoinHandle<()>>,
}

/// The firewall controller. All mutation is serialized by a single
/// operation mutex; the inner state mutex is never held across an agent
/// call.
pub struct FirewallController {
    config: FirewallConfig,
    agent: Arc<dyn AgentClient>,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    mfa: Arc<dyn MfaPolicy>,
    id_gen: UuidIdGen,
    op_lock: tokio::sync::Mutex<()>,
    inner: Mutex<Inner>,
}

impl FirewallController {
    pub fn new(
        config: FirewallConfig,
        agent: Arc<dyn AgentClient>,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
        mfa: Arc<dyn MfaPolicy>,
    ) -> Result<Self, EngineError> {
        let state = match nos_store::load_json::<FirewallState>(&config.state_path)? {
            Some(state) if state.version > FIREWALL_DOC_VERSION => {
                return Err(EngineError::fatal(
                    "state_version",
                    format!(
                        "firewall state is version {}, newer than supported {}",
                        state.version, FIREWALL_DOC_VERSION
                    ),
                ));
            }
            Some(state) => state,
            None => FirewallState::default(),
        };

        Ok(Self {
            config,
            agent,
            clock,
            events,
            mfa,
            id_gen: UuidIdGen,
            op_lock: tokio::sync::Mutex::new(()),
            inner: Mutex::new(Inner {
                state,
                plans: HashMap::new(),
                confirm_timer: None,
            }),
        })
    }

    /// Current controller state.
    pub fn state(&self) -> FirewallState {
        self.inner.lock().state.clone()
    }

    /// Look up a previously computed plan.
    pub fn plan_by_id(&self, plan_id: &PlanId) -> Option<FirewallPlan> {
        self.inner.lock().plans.get(plan_id).cloned()
    }

    /// Compute a plan for a desired mode. Pure: no system change.
    pub fn plan(&self, desired: FirewallMode) -> FirewallPlan {
        let current = self.inner.lock().state.mode;
        let current_rules = ruleset_for_mode(current, &self.config.options);
        let desired_rules = ruleset_for_mode(desired, &self.config.options);

        let now = self.clock.now();
        let plan = FirewallPlan {
            plan_id: PlanId::new(self.id_gen.next()),
            current,
            desired,
            diff: compute_diff(&current_rules.rules, &desired_rules.rules),
            dry_run_text: render_nft(&desired_rules),
            created_at: now,
            expires_at: now + chrono::Duration::seconds(PLAN_TTL_SECS),
        };

        self.inner
            .lock()
            .plans
            .insert(plan.plan_id.clone(), plan.clone());
        self.events.publish(Event::FirewallPlanCreated {
            plan_id: plan.plan_id.clone(),
            desired,
        });
        plan
    }

    /// Apply a plan: back up the live ruleset, load the new one, and arm
    /// the confirm timer. A load failure restores the backup immediately.
    pub async fn apply(
        self: &Arc<Self>,
        plan_id: &PlanId,
        rollback_timeout: Duration,
    ) -> Result<PendingApply, EngineError> {
        let _op = self.op_lock.lock().await;

        let (plan, current) = {
            let inner = self.inner.lock();
            let plan = inner
                .plans
                .get(plan_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("plan", plan_id.as_str()))?;
            if inner.state.status == FirewallStatus::PendingConfirm {
                return Err(EngineError::precondition(
                    "pending_confirm",
                    "another apply is awaiting confirmation",
                ));
            }
            (plan, inner.state.mode)
        };

        let now = self.clock.now();
        if now > plan.expires_at {
            return Err(EngineError::precondition(
                "plan_expired",
                format!("plan {plan_id} expired at {}", plan.expires_at),
            ));
        }
        if plan.current != current {
            return Err(EngineError::precondition(
                "plan_stale",
                format!("plan was computed against mode {}, host is {current}", plan.current),
            ));
        }
        if plan.desired.requires_mfa_policy() && !self.mfa.admin_mfa_enrolled() {
            return Err(EngineError::precondition(
                "mfa_not_enrolled",
                format!(
                    "mode {} requires at least one admin with MFA enrolled",
                    plan.desired
                ),
            ));
        }

        let backup = backup_path(&self.config.ruleset_path);
        self.agent
            .call(
                "firewall.save_ruleset",
                serde_json::json!({ "path": backup.display().to_string() }),
            )
            .await?;

        write_text_atomic(&self.config.ruleset_path, &plan.dry_run_text)?;

        if let Err(e) = self
            .agent
            .call(
                "firewall.load_ruleset",
                serde_json::json!({ "path": self.config.ruleset_path.display().to_string() }),
            )
            .await
        {
            warn!("ruleset load failed, restoring backup: {}", e);
            self.load_backup(&backup).await;
            self.rewrite_ruleset_file(current);
            return Err(e.into());
        }

        // Coupled VPN state: entering/leaving vpn_only flips the
        // interface in the same apply.
        if let Err(e) = self.sync_vpn(current, plan.desired).await {
            warn!("vpn transition failed, restoring backup: {}", e);
            self.load_backup(&backup).await;
            self.rewrite_ruleset_file(current);
            return Err(e);
        }

        let pending = PendingApply {
            plan_id: plan.plan_id.clone(),
            previous_mode: current,
            desired_mode: plan.desired,
            applied_at: now,
            pending_expires_at: now
                + chrono::Duration::from_std(rollback_timeout)
                    .unwrap_or_else(|_| chrono::Duration::seconds(60)),
        };

        {
            let mut inner = self.inner.lock();
            inner.state.mode = plan.desired;
            inner.state.status = FirewallStatus::PendingConfirm;
            inner.state.pending = Some(pending.clone());
        }
        self.persist_state()?;
        self.arm_confirm_timer(plan.plan_id.clone(), rollback_timeout);

        self.events.publish(Event::FirewallApplied {
            plan_id: plan.plan_id.clone(),
            mode: plan.desired,
        });
        info!(plan_id = %plan.plan_id, mode = %plan.desired, "firewall applied, awaiting confirm");
        Ok(pending)
    }

    /// Confirm a pending apply. The caller's reachability proves the new
    /// rules did not lock the administrator out.
    pub async fn confirm(
        &self,
        plan_id: &PlanId,
        identity: &Identity,
    ) -> Result<FirewallState, EngineError> {
        let _op = self.op_lock.lock().await;

        let pending = {
            let inner = self.inner.lock();
            match (&inner.state.status, &inner.state.pending) {
                (FirewallStatus::PendingConfirm, Some(pending)) if &pending.plan_id == plan_id => {
                    pending.clone()
                }
                _ => {
                    return Err(EngineError::precondition(
                        "no_pending_apply",
                        format!("no pending apply for plan {plan_id}"),
                    ));
                }
            }
        };

        if self.clock.now() > pending.pending_expires_at {
            return Err(EngineError::precondition(
                "confirm_expired",
                "the confirm window elapsed; the previous ruleset is being restored",
            ));
        }

        if self.config.confirm_requires_mfa
            && pending.desired_mode.requires_mfa_policy()
            && !identity.mfa_verified
        {
            return Err(EngineError::precondition(
                "mfa_required",
                format!("confirming mode {} requires MFA", pending.desired_mode),
            ));
        }

        {
            let mut inner = self.inner.lock();
            if let Some(timer) = inner.confirm_timer.take() {
                timer.abort();
            }
            inner.state.status = FirewallStatus::Active;
            inner.state.pending = None;
            inner.plans.remove(plan_id);
        }
        self.persist_state()?;
        self.drop_backup();

        self.events.publish(Event::FirewallConfirmed {
            plan_id: plan_id.clone(),
            mode: pending.desired_mode,
        });
        info!(plan_id = %plan_id, mode = %pending.desired_mode, "firewall confirmed");
        Ok(self.state())
    }

    /// Manual rollback of a pending apply.
    pub async fn rollback(&self, plan_id: &PlanId) -> Result<FirewallState, EngineError> {
        self.rollback_inner(Some(plan_id), false).await?;
        Ok(self.state())
    }

    /// Re-arm the confirm timer after a restart, with the remaining time.
    /// A window that elapsed while the daemon was down rolls back now.
    pub fn rearm_on_startup(self: &Arc<Self>) {
        let pending = self.inner.lock().state.pending.clone();
        let Some(pending) = pending else {
            return;
        };

        let now = self.clock.now();
        let remaining = (pending.pending_expires_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        info!(
            plan_id = %pending.plan_id,
            remaining_secs = remaining.as_secs(),
            "re-arming firewall confirm timer"
        );
        self.arm_confirm_timer(pending.plan_id, remaining);
    }

    fn arm_confirm_timer(self: &Arc<Self>, plan_id: PlanId, delay: Duration) {
        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = controller.rollback_inner(Some(&plan_id), true).await {
                debug!(plan_id = %plan_id, "auto-rollback skipped: {}", e);
            }
        });

        let mut inner = self.inner.lock();
        if let Some(previous) = inner.confirm_timer.replace(handle) {
            previous.abort();
        }
    }

    async fn rollback_inner(&self, plan_id: Option<&PlanId>, auto: bool) -> Result<(), EngineError> {
        let _op = self.op_lock.lock().await;

        let pending = {
            let inner = self.inner.lock();
            match &inner.state.pending {
                Some(pending) if plan_id.is_none() || plan_id == Some(&pending.plan_id) => {
                    pending.clone()
                }
                _ => {
                    return Err(EngineError::precondition(
                        "no_pending_apply",
                        "nothing to roll back",
                    ));
                }
            }
        };

        let backup = backup_path(&self.config.ruleset_path);
        self.agent
            .call(
                "firewall.load_ruleset",
                serde_json::json!({ "path": backup.display().to_string() }),
            )
            .await?;

        // Reverse the VPN coupling from the apply.
        if let Err(e) = self
            .sync_vpn(pending.desired_mode, pending.previous_mode)
            .await
        {
            warn!("vpn transition during rollback failed: {}", e);
        }

        // Keep the on-disk script in sync with what the kernel now runs.
        self.rewrite_ruleset_file(pending.previous_mode);

        {
            let mut inner = self.inner.lock();
            if let Some(timer) = inner.confirm_timer.take() {
                timer.abort();
            }
            inner.state.mode = pending.previous_mode;
            inner.state.status = FirewallStatus::Active;
            inner.state.pending = None;
            inner.plans.remove(&pending.plan_id);
        }
        self.persist_state()?;
        self.drop_backup();

        let event = if auto {
            Event::FirewallRollbackAuto {
                plan_id: pending.plan_id.clone(),
                restored_mode: pending.previous_mode,
            }
        } else {
            Event::FirewallRollbackManual {
                plan_id: pending.plan_id.clone(),
                restored_mode: pending.previous_mode,
            }
        };
        self.events.publish(event);
        info!(
            plan_id = %pending.plan_id,
            mode = %pending.previous_mode,
            auto,
            "firewall rolled back"
        );
        Ok(())
    }

    async fn sync_vpn(&self, from: FirewallMode, to: FirewallMode) -> Result<(), EngineError> {
        if to == FirewallMode::VpnOnly && from != FirewallMode::VpnOnly {
            self.agent.call("vpn.up", serde_json::json!({})).await?;
        } else if from == FirewallMode::VpnOnly && to != FirewallMode::VpnOnly {
            self.agent.call("vpn.down", serde_json::json!({})).await?;
        }
        Ok(())
    }

    async fn load_backup(&self, backup: &std::path::Path) {
        if let Err(e) = self
            .agent
            .call(
                "firewall.load_ruleset",
                serde_json::json!({ "path": backup.display().to_string() }),
            )
            .await
        {
            warn!("restoring ruleset backup failed: {}", e);
        }
    }

    /// Rewrite the on-disk script to match a mode's rendered ruleset.
    fn rewrite_ruleset_file(&self, mode: FirewallMode) {
        let rules = ruleset_for_mode(mode, &self.config.options);
        if let Err(e) = write_text_atomic(&self.config.ruleset_path, &render_nft(&rules)) {
            warn!("rewriting ruleset file: {}", e);
        }
    }

    fn drop_backup(&self) {
        let backup = backup_path(&self.config.ruleset_path);
        if backup.exists() {
            if let Err(e) = std::fs::remove_file(&backup) {
                warn!(backup = %backup.display(), "dropping ruleset backup: {}", e);
            }
        }
    }

    fn persist_state(&self) -> Result<(), EngineError> {
        let state = self.inner.lock().state.clone();
        nos_store::save_json(&self.config.state_path, &state)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "../firewall_tests.rs"]
mod tests;
