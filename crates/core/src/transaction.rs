// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable transaction records for multi-target mutations.

use crate::id::TxId;
use crate::snapshot::SnapshotRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of mutation a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    SystemUpdate,
    AppInstall,
    AppUpgrade,
    AppRollback,
    FirewallApply,
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TxKind::SystemUpdate => "system_update",
            TxKind::AppInstall => "app_install",
            TxKind::AppUpgrade => "app_upgrade",
            TxKind::AppRollback => "app_rollback",
            TxKind::FirewallApply => "firewall_apply",
        };
        f.write_str(s)
    }
}

/// Outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxResult {
    Pending,
    Committed,
    Failed,
    RolledBack,
}

/// One target touched by a transaction, with its pre-mutation snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxTarget {
    pub target_id: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotRef>,
}

/// The durable record of a mutation spanning one or more targets.
///
/// Completed transactions are never mutated, except to mark `rolled_back`
/// with a back-reference to the rolling-back transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: TxId,
    pub time: DateTime<Utc>,
    pub kind: TxKind,
    pub targets: Vec<TxTarget>,
    pub result: TxResult,
    /// Set when `result == RolledBack`: the transaction that rolled this back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_by: Option<TxId>,
    /// Failure reason, when `result == Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Transaction {
    pub fn new(tx_id: TxId, time: DateTime<Utc>, kind: TxKind, targets: Vec<TxTarget>) -> Self {
        Self {
            tx_id,
            time,
            kind,
            targets,
            result: TxResult::Pending,
            rolled_back_by: None,
            reason: None,
        }
    }

    /// Whether this transaction still pins its targets' snapshots
    /// (pending transactions protect their snapshots from pruning).
    pub fn pins_snapshots(&self) -> bool {
        self.result == TxResult::Pending
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;
