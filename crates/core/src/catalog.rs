// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog entry DTOs — immutable descriptions of installable apps.

use crate::app::PortMapping;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health probe kind declared by a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthKind {
    /// Container-reported health (compose healthcheck).
    Container,
    /// HTTP probe against a path on the app's primary port.
    Http,
}

/// Health probe declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSpec {
    pub kind: HealthKind,
    /// Probe path for `http` health (e.g. `/`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Consecutive healthy observations required before the app counts
    /// as healthy.
    #[serde(default = "default_healthy_after")]
    pub healthy_after: u32,
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    2
}

fn default_healthy_after() -> u32 {
    2
}

fn default_health_timeout_secs() -> u64 {
    60
}

impl Default for HealthSpec {
    fn default() -> Self {
        Self {
            kind: HealthKind::Container,
            path: None,
            interval_secs: default_interval_secs(),
            healthy_after: default_healthy_after(),
            timeout_secs: default_health_timeout_secs(),
        }
    }
}

/// Declared volume of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Default resource caps injected for unprivileged apps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// Memory limit in compose syntax (e.g. `512m`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Defaults bundled with a catalog entry: env, ports, volumes, resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppDefaults {
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    #[serde(default)]
    pub resources: ResourceLimits,
}

/// Immutable description of an installable app.
///
/// Entries are merged from the built-in catalog and remote sources;
/// they are replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Slug, unique in the merged catalog.
    pub id: String,
    pub version: String,
    /// Compose template text with `${VAR}` placeholders.
    pub compose_template: String,
    /// JSON Schema for install parameters, when the entry declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,
    #[serde(default)]
    pub defaults: AppDefaults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSpec>,
    #[serde(default)]
    pub needs_privileged: bool,
}

/// A parsed catalog document (built-in, remote source, or cache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    /// Schema version; loaders refuse newer-major documents.
    pub version: u32,
    #[serde(default)]
    pub entries: Vec<CatalogEntry>,
}

/// Current catalog document major version.
pub const CATALOG_DOC_VERSION: u32 = 1;

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
