// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update run state machine and its persisted document.

use crate::id::TxId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bounded state machine for a system update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    Checking,
    Downloading,
    Applying,
    Verifying,
    Success,
    Failed,
    RollingBack,
    RolledBack,
}

impl UpdateState {
    /// Terminal states of a run. `Idle` is the resting state between runs,
    /// not a terminal one — an interrupted daemon that restarts in a
    /// non-idle non-terminal state marks the run failed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UpdateState::Success | UpdateState::Failed | UpdateState::RolledBack
        )
    }

    /// Valid transitions of the run state machine.
    pub fn can_transition(self, next: UpdateState) -> bool {
        use UpdateState::*;
        match self {
            Idle => matches!(next, Checking | Downloading),
            Checking => matches!(next, Idle | Downloading | Failed),
            Downloading => matches!(next, Applying | Failed),
            Applying => matches!(next, Verifying | Failed | RollingBack),
            Verifying => matches!(next, Success | Failed | RollingBack),
            RollingBack => matches!(next, RolledBack | Failed),
            // New runs reset terminal states back to the pipeline entry;
            // a committed run can still be rolled back manually.
            Success => matches!(next, Idle | Checking | Downloading | RollingBack),
            RolledBack => matches!(next, Idle | Checking | Downloading),
            Failed => matches!(next, Idle | Checking | Downloading | RollingBack),
        }
    }
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpdateState::Idle => "idle",
            UpdateState::Checking => "checking",
            UpdateState::Downloading => "downloading",
            UpdateState::Applying => "applying",
            UpdateState::Verifying => "verifying",
            UpdateState::Success => "success",
            UpdateState::Failed => "failed",
            UpdateState::RollingBack => "rolling_back",
            UpdateState::RolledBack => "rolled_back",
        };
        f.write_str(s)
    }
}

/// Progress surfaced to clients while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProgress {
    pub state: UpdateState,
    /// 0–100, coarse; bumped at phase boundaries.
    pub percent: u8,
    pub message: String,
}

impl Default for UpdateProgress {
    fn default() -> Self {
        Self {
            state: UpdateState::Idle,
            percent: 0,
            message: String::new(),
        }
    }
}

/// Persisted update state (`update/state.json`), written atomically after
/// every phase boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStateDoc {
    /// Document schema version; loaders refuse newer-major documents.
    pub version: u32,
    pub state: UpdateState,
    #[serde(default)]
    pub progress: UpdateProgress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure reason (`interrupted` for runs cut short by a restart).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Transaction recording the run's snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<TxId>,
}

/// Current update state document major version.
pub const UPDATE_DOC_VERSION: u32 = 1;

impl Default for UpdateStateDoc {
    fn default() -> Self {
        Self {
            version: UPDATE_DOC_VERSION,
            state: UpdateState::Idle,
            progress: UpdateProgress::default(),
            last_check: None,
            started_at: None,
            finished_at: None,
            reason: None,
            tx_id: None,
        }
    }
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;
