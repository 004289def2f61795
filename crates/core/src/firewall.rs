// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Firewall modes, rules, plans, and the rule diff model.
//!
//! Rules are identified by stable slugs; equality ignores position, and
//! emitted ordering derives from `(chain, priority, id)`.

use crate::id::PlanId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network exposure mode of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirewallMode {
    LanOnly,
    VpnOnly,
    Tunnel,
    Direct,
}

impl FirewallMode {
    /// Modes that expose the HTTP API beyond the LAN and therefore require
    /// an MFA-enrolled admin by policy.
    pub fn requires_mfa_policy(self) -> bool {
        matches!(self, FirewallMode::Direct | FirewallMode::Tunnel)
    }
}

impl std::fmt::Display for FirewallMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FirewallMode::LanOnly => "lan_only",
            FirewallMode::VpnOnly => "vpn_only",
            FirewallMode::Tunnel => "tunnel",
            FirewallMode::Direct => "direct",
        };
        f.write_str(s)
    }
}

/// Chain a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Input,
    Forward,
    Output,
}

/// Terminal action of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Accept,
    Drop,
    Reject,
}

/// A firewall rule with a stable slug id (e.g. `allow-lan-https`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub chain: Chain,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Source constraint (CIDR or interface), when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub action: RuleAction,
}

/// A complete ruleset for a mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub mode: FirewallMode,
    pub rules: Vec<Rule>,
}

impl Ruleset {
    /// Rules in emission order: `(chain, priority, id)`.
    pub fn sorted_rules(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by(|a, b| {
            (a.chain, a.priority, a.id.as_str()).cmp(&(b.chain, b.priority, b.id.as_str()))
        });
        rules
    }
}

/// Diff operation between two rulesets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Add,
    Remove,
    Modify,
}

/// One diff entry, keyed by rule slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDiff {
    pub op: DiffOp,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Rule>,
}

/// Compute the diff from `current` to `desired`, keyed by rule id.
///
/// Rule equality ignores position; output order follows the desired
/// ruleset's emission order, with removals last.
pub fn compute_diff(current: &[Rule], desired: &[Rule]) -> Vec<RuleDiff> {
    let mut diff = Vec::new();

    for rule in desired {
        match current.iter().find(|r| r.id == rule.id) {
            None => diff.push(RuleDiff {
                op: DiffOp::Add,
                id: rule.id.clone(),
                before: None,
                after: Some(rule.clone()),
            }),
            Some(old) if old != rule => diff.push(RuleDiff {
                op: DiffOp::Modify,
                id: rule.id.clone(),
                before: Some(old.clone()),
                after: Some(rule.clone()),
            }),
            Some(_) => {}
        }
    }

    for rule in current {
        if !desired.iter().any(|r| r.id == rule.id) {
            diff.push(RuleDiff {
                op: DiffOp::Remove,
                id: rule.id.clone(),
                before: Some(rule.clone()),
                after: None,
            });
        }
    }

    diff
}

/// A computed, time-bounded description of a mode change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallPlan {
    pub plan_id: PlanId,
    pub current: FirewallMode,
    pub desired: FirewallMode,
    pub diff: Vec<RuleDiff>,
    pub dry_run_text: String,
    pub created_at: DateTime<Utc>,
    /// Plans expire 5 minutes after creation.
    pub expires_at: DateTime<Utc>,
}

/// Pending state after a successful apply, awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApply {
    pub plan_id: PlanId,
    pub previous_mode: FirewallMode,
    pub desired_mode: FirewallMode,
    pub applied_at: DateTime<Utc>,
    /// Auto-rollback fires when this passes without a confirm.
    pub pending_expires_at: DateTime<Utc>,
}

/// Operator-visible status of the firewall controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirewallStatus {
    Active,
    PendingConfirm,
}

/// Persisted firewall state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallState {
    /// Document schema version; loaders refuse newer-major documents.
    pub version: u32,
    pub mode: FirewallMode,
    pub status: FirewallStatus,
    /// Present iff `status == pending_confirm`. Survives restarts so the
    /// confirm timer can be re-armed with the remaining time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingApply>,
}

/// Current firewall document major version.
pub const FIREWALL_DOC_VERSION: u32 = 1;

impl Default for FirewallState {
    fn default() -> Self {
        Self {
            version: FIREWALL_DOC_VERSION,
            mode: FirewallMode::LanOnly,
            status: FirewallStatus::Active,
            pending: None,
        }
    }
}

#[cfg(test)]
#[path = "firewall_tests.rs"]
mod tests;
