// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types published on the in-process bus and the journal.
//!
//! Events are observational: background failure reporting, SSE streams, and
//! webhook delivery consume them, but no correctness-critical path depends
//! on delivery.
//!
//! Serializes with `{"type": "app.install.started", ...fields}` format.

use crate::firewall::FirewallMode;
use crate::id::{PlanId, SnapshotId, TxId};
use crate::snapshot::SnapshotKind;
use crate::update::UpdateState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity attached to a journaled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Events emitted by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- app lifecycle --
    #[serde(rename = "app.install.started")]
    AppInstallStarted { id: String },

    #[serde(rename = "app.install.completed")]
    AppInstallCompleted { id: String, version: String },

    #[serde(rename = "app.install.failed")]
    AppInstallFailed { id: String, error: String },

    #[serde(rename = "app.upgrade.started")]
    AppUpgradeStarted {
        id: String,
        from_version: String,
        to_version: String,
    },

    #[serde(rename = "app.upgrade.completed")]
    AppUpgradeCompleted { id: String, version: String },

    #[serde(rename = "app.upgrade.failed")]
    AppUpgradeFailed { id: String, error: String },

    #[serde(rename = "app.rollback.started")]
    AppRollbackStarted { id: String, snapshot_id: SnapshotId },

    #[serde(rename = "app.rollback.completed")]
    AppRollbackCompleted { id: String },

    #[serde(rename = "app.rollback.failed")]
    AppRollbackFailed { id: String, error: String },

    #[serde(rename = "app.started")]
    AppStarted { id: String },

    #[serde(rename = "app.stopped")]
    AppStopped { id: String },

    #[serde(rename = "app.deleted")]
    AppDeleted { id: String, kept_data: bool },

    #[serde(rename = "app.health.changed")]
    AppHealthChanged { id: String, healthy: bool },

    // -- snapshots --
    #[serde(rename = "snapshot.created")]
    SnapshotCreated {
        target: String,
        snapshot_id: SnapshotId,
        kind: SnapshotKind,
        tag: String,
    },

    #[serde(rename = "snapshot.pruned")]
    SnapshotPruned {
        target: String,
        snapshot_id: SnapshotId,
    },

    // -- catalog --
    #[serde(rename = "catalog.refreshed")]
    CatalogRefreshed { sources: u32, entries: u32 },

    #[serde(rename = "catalog.source.rejected")]
    CatalogSourceRejected { source: String, reason: String },

    // -- updates --
    #[serde(rename = "update.state.changed")]
    UpdateStateChanged {
        state: UpdateState,
        percent: u8,
        message: String,
    },

    #[serde(rename = "update.completed")]
    UpdateCompleted { tx_id: TxId },

    #[serde(rename = "update.failed")]
    UpdateFailed { reason: String },

    #[serde(rename = "update.rolled_back")]
    UpdateRolledBack { tx_id: TxId },

    // -- firewall --
    #[serde(rename = "firewall.plan.created")]
    FirewallPlanCreated {
        plan_id: PlanId,
        desired: FirewallMode,
    },

    #[serde(rename = "firewall.applied")]
    FirewallApplied { plan_id: PlanId, mode: FirewallMode },

    #[serde(rename = "firewall.confirmed")]
    FirewallConfirmed { plan_id: PlanId, mode: FirewallMode },

    /// Confirm timer fired; the previous ruleset was restored.
    #[serde(rename = "firewall.rollback.auto")]
    FirewallRollbackAuto {
        plan_id: PlanId,
        restored_mode: FirewallMode,
    },

    #[serde(rename = "firewall.rollback.manual")]
    FirewallRollbackManual {
        plan_id: PlanId,
        restored_mode: FirewallMode,
    },

    // -- agent --
    #[serde(rename = "agent.verb.denied")]
    AgentVerbDenied { verb: String },

    // -- recovery --
    #[serde(rename = "recovery.otp.generated")]
    RecoveryOtpGenerated,
}

impl Event {
    /// Severity for the journal.
    pub fn severity(&self) -> Severity {
        match self {
            Event::AppInstallFailed { .. }
            | Event::AppUpgradeFailed { .. }
            | Event::AppRollbackFailed { .. }
            | Event::UpdateFailed { .. }
            | Event::AgentVerbDenied { .. } => Severity::Error,

            Event::CatalogSourceRejected { .. }
            | Event::FirewallRollbackAuto { .. }
            | Event::FirewallRollbackManual { .. }
            | Event::UpdateRolledBack { .. }
            | Event::AppHealthChanged { healthy: false, .. } => Severity::Warning,

            _ => Severity::Info,
        }
    }

    /// The entity this event is about, when there is one.
    pub fn target(&self) -> Option<String> {
        match self {
            Event::AppInstallStarted { id }
            | Event::AppInstallCompleted { id, .. }
            | Event::AppInstallFailed { id, .. }
            | Event::AppUpgradeStarted { id, .. }
            | Event::AppUpgradeCompleted { id, .. }
            | Event::AppUpgradeFailed { id, .. }
            | Event::AppRollbackStarted { id, .. }
            | Event::AppRollbackCompleted { id }
            | Event::AppRollbackFailed { id, .. }
            | Event::AppStarted { id }
            | Event::AppStopped { id }
            | Event::AppDeleted { id, .. }
            | Event::AppHealthChanged { id, .. } => Some(id.clone()),

            Event::SnapshotCreated { target, .. } | Event::SnapshotPruned { target, .. } => {
                Some(target.clone())
            }

            Event::CatalogSourceRejected { source, .. } => Some(source.clone()),

            Event::UpdateCompleted { tx_id } | Event::UpdateRolledBack { tx_id } => {
                Some(tx_id.to_string())
            }

            Event::FirewallPlanCreated { plan_id, .. }
            | Event::FirewallApplied { plan_id, .. }
            | Event::FirewallConfirmed { plan_id, .. }
            | Event::FirewallRollbackAuto { plan_id, .. }
            | Event::FirewallRollbackManual { plan_id, .. } => Some(plan_id.to_string()),

            Event::AgentVerbDenied { verb } => Some(verb.clone()),

            Event::CatalogRefreshed { .. }
            | Event::UpdateStateChanged { .. }
            | Event::UpdateFailed { .. }
            | Event::RecoveryOtpGenerated => None,
        }
    }

    /// Wire type tag (the serde rename), for log lines and filters.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Event::AppInstallStarted { .. } => "app.install.started",
            Event::AppInstallCompleted { .. } => "app.install.completed",
            Event::AppInstallFailed { .. } => "app.install.failed",
            Event::AppUpgradeStarted { .. } => "app.upgrade.started",
            Event::AppUpgradeCompleted { .. } => "app.upgrade.completed",
            Event::AppUpgradeFailed { .. } => "app.upgrade.failed",
            Event::AppRollbackStarted { .. } => "app.rollback.started",
            Event::AppRollbackCompleted { .. } => "app.rollback.completed",
            Event::AppRollbackFailed { .. } => "app.rollback.failed",
            Event::AppStarted { .. } => "app.started",
            Event::AppStopped { .. } => "app.stopped",
            Event::AppDeleted { .. } => "app.deleted",
            Event::AppHealthChanged { .. } => "app.health.changed",
            Event::SnapshotCreated { .. } => "snapshot.created",
            Event::SnapshotPruned { .. } => "snapshot.pruned",
            Event::CatalogRefreshed { .. } => "catalog.refreshed",
            Event::CatalogSourceRejected { .. } => "catalog.source.rejected",
            Event::UpdateStateChanged { .. } => "update.state.changed",
            Event::UpdateCompleted { .. } => "update.completed",
            Event::UpdateFailed { .. } => "update.failed",
            Event::UpdateRolledBack { .. } => "update.rolled_back",
            Event::FirewallPlanCreated { .. } => "firewall.plan.created",
            Event::FirewallApplied { .. } => "firewall.applied",
            Event::FirewallConfirmed { .. } => "firewall.confirmed",
            Event::FirewallRollbackAuto { .. } => "firewall.rollback.auto",
            Event::FirewallRollbackManual { .. } => "firewall.rollback.manual",
            Event::AgentVerbDenied { .. } => "agent.verb.denied",
            Event::RecoveryOtpGenerated => "recovery.otp.generated",
        }
    }
}

/// A journaled event line (`events.jsonl`):
/// `{id, type, actor, target, timestamp, severity, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub payload: Event,
}

impl EventRecord {
    pub fn new(id: String, actor: impl Into<String>, timestamp: DateTime<Utc>, event: Event) -> Self {
        Self {
            id,
            type_tag: event.type_tag().to_string(),
            actor: actor.into(),
            target: event.target(),
            timestamp,
            severity: event.severity(),
            payload: event,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
