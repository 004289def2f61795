// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Installed app record and its status state machine.

use crate::snapshot::SnapshotRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Status of an installed app.
///
/// Transitions only flow through the lifecycle engine; see
/// [`AppStatus::can_transition`] for the valid edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
    Upgrading,
    RollingBack,
    Unknown,
}

impl AppStatus {
    /// Valid transitions:
    ///
    /// ```text
    /// stopped → starting → running → stopping → stopped
    /// running → upgrading → running | error | rolling_back → running | error
    /// any    → error
    /// error  → starting | stopping | rolling_back
    /// ```
    ///
    /// `unknown` is an observation state set by reconciliation; the engine
    /// may drive an unknown app back through starting or stopping. A
    /// running app may also enter `rolling_back` directly (the manual
    /// rollback operation).
    pub fn can_transition(self, next: AppStatus) -> bool {
        use AppStatus::*;
        if next == Error {
            return true;
        }
        match self {
            Stopped => matches!(next, Starting),
            Starting => matches!(next, Running | Stopped),
            Running => matches!(next, Stopping | Upgrading | RollingBack),
            Stopping => matches!(next, Stopped),
            Upgrading => matches!(next, Running | RollingBack),
            RollingBack => matches!(next, Running),
            Error => matches!(next, Starting | Stopping | RollingBack),
            Unknown => matches!(next, Starting | Stopping),
        }
    }

    /// Whether the app is in the middle of a mutation.
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            AppStatus::Starting | AppStatus::Stopping | AppStatus::Upgrading | AppStatus::RollingBack
        )
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppStatus::Stopped => "stopped",
            AppStatus::Starting => "starting",
            AppStatus::Running => "running",
            AppStatus::Stopping => "stopping",
            AppStatus::Error => "error",
            AppStatus::Upgrading => "upgrading",
            AppStatus::RollingBack => "rolling_back",
            AppStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Declared port of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
    #[serde(default = "default_proto")]
    pub proto: String,
}

fn default_proto() -> String {
    "tcp".to_string()
}

/// Last health observation for an installed app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthObservation {
    pub healthy: bool,
    pub observed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// An app realised on this host.
///
/// Written to the registry only on commit — no partial state leaks here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledApp {
    /// Equals the catalog entry id.
    pub id: String,
    pub version: String,
    pub status: AppStatus,
    /// Parameters as validated against the schema in force when accepted.
    pub params: BTreeMap<String, serde_json::Value>,
    /// sha256 over version + canonical params; used for upgrade idempotence.
    pub params_digest: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthObservation>,
    pub installed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub snapshots: Vec<SnapshotRef>,
    /// Last error detail when `status == error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The app registry document (`apps.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppRegistry {
    #[serde(default)]
    pub apps: BTreeMap<String, InstalledApp>,
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
