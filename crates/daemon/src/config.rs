// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration.
//!
//! Loaded from `/etc/nos/nosd.toml` (0600, service user). Every path in
//! the persistent-state layout is configurable; the defaults below are
//! the documented layout. `NOS_CONFIG` overrides the config file path,
//! `NOS_RECOVERY=1` enables the loopback recovery endpoints for one boot.

use nos_catalog::SourceConfig;
use nos_engine::firewall::FirewallOptions;
use nos_engine::update::{UpdateTargetConfig, DEFAULT_DISK_FLOOR};
use nos_engine::SnapshotMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("invalid config at {}: {error}", .path.display())]
    Parse {
        path: PathBuf,
        error: toml::de::Error,
    },
}

/// On-disk TOML shape. Everything is optional; absent values fall back
/// to the documented defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    http: HttpSection,
    #[serde(default)]
    paths: PathsSection,
    #[serde(default)]
    agent: AgentSection,
    #[serde(default)]
    catalog: CatalogSection,
    #[serde(default)]
    apps: AppsSection,
    #[serde(default)]
    updates: UpdatesSection,
    #[serde(default)]
    firewall: FirewallSection,
}

#[derive(Debug, Default, Deserialize)]
struct HttpSection {
    listen: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PathsSection {
    state_dir: Option<PathBuf>,
    apps_state_dir: Option<PathBuf>,
    snapshots_dir: Option<PathBuf>,
    apps_root: Option<PathBuf>,
    proxy_snippet_dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
    ruleset_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentSection {
    socket_path: Option<PathBuf>,
    token_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogSection {
    #[serde(default)]
    sources: Vec<SourceConfig>,
    refresh_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AppsSection {
    keep_snapshots: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct UpdatesSection {
    #[serde(default)]
    targets: Vec<UpdateTargetConfig>,
    keep_snapshots: Option<usize>,
    #[serde(default)]
    critical_services: Vec<String>,
    disk_floor_bytes: Option<u64>,
    health_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FirewallSection {
    confirm_requires_mfa: Option<bool>,
    mfa_enrolled: Option<bool>,
    options: Option<FirewallOptions>,
}

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Loopback HTTP listen address.
    pub http_listen: String,

    // -- persistent state layout --
    pub state_dir: PathBuf,
    pub apps_state_dir: PathBuf,
    pub snapshots_dir: PathBuf,
    pub apps_root: PathBuf,
    pub proxy_snippet_dir: PathBuf,
    pub log_path: PathBuf,
    pub ruleset_path: PathBuf,

    // -- agent --
    pub agent_socket: PathBuf,
    pub agent_token: PathBuf,

    // -- catalog --
    pub catalog_sources: Vec<SourceConfig>,
    pub catalog_refresh_interval_secs: u64,

    // -- retention --
    pub apps_keep_snapshots: usize,
    pub updates_keep_snapshots: usize,

    // -- updates --
    pub update_targets: Vec<UpdateTargetConfig>,
    pub critical_services: Vec<String>,
    pub disk_floor_bytes: u64,
    pub update_health_url: Option<String>,

    // -- firewall --
    pub confirm_requires_mfa: bool,
    pub mfa_enrolled: bool,
    pub firewall_options: FirewallOptions,

    /// Boot flag: loopback recovery endpoints enabled.
    pub recovery_mode: bool,
}

impl Config {
    /// Load from the default (or `NOS_CONFIG`-overridden) path. A
    /// missing file yields the documented defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("NOS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/etc/nos/nosd.toml"));
        let file = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|error| ConfigError::Io {
                path: path.clone(),
                error,
            })?;
            toml::from_str(&text).map_err(|error| ConfigError::Parse {
                path: path.clone(),
                error,
            })?
        } else {
            ConfigFile::default()
        };
        Ok(Self::from_file(file))
    }

    fn from_file(file: ConfigFile) -> Self {
        let recovery_mode = std::env::var("NOS_RECOVERY").is_ok_and(|v| v == "1");
        Self {
            http_listen: file
                .http
                .listen
                .unwrap_or_else(|| "127.0.0.1:9000".to_string()),

            state_dir: file
                .paths
                .state_dir
                .unwrap_or_else(|| "/var/lib/nos/state".into()),
            apps_state_dir: file
                .paths
                .apps_state_dir
                .unwrap_or_else(|| "/var/lib/nos/apps".into()),
            snapshots_dir: file
                .paths
                .snapshots_dir
                .unwrap_or_else(|| "/var/lib/nos/snapshots".into()),
            apps_root: file.paths.apps_root.unwrap_or_else(|| "/srv/apps".into()),
            proxy_snippet_dir: file
                .paths
                .proxy_snippet_dir
                .unwrap_or_else(|| "/etc/nos/proxy.d".into()),
            log_path: file
                .paths
                .log_path
                .unwrap_or_else(|| "/var/lib/nos/state/nosd.log".into()),
            ruleset_path: file
                .paths
                .ruleset_path
                .unwrap_or_else(|| "/etc/nos/firewall/ruleset.nft".into()),

            agent_socket: file
                .agent
                .socket_path
                .unwrap_or_else(|| "/run/nos/agent.sock".into()),
            agent_token: file
                .agent
                .token_path
                .unwrap_or_else(|| "/etc/nos/agent.token".into()),

            catalog_sources: file.catalog.sources,
            catalog_refresh_interval_secs: file.catalog.refresh_interval_secs.unwrap_or(300),

            apps_keep_snapshots: file.apps.keep_snapshots.unwrap_or(5),
            updates_keep_snapshots: file.updates.keep_snapshots.unwrap_or(5),

            update_targets: if file.updates.targets.is_empty() {
                vec![UpdateTargetConfig {
                    id: "etc".into(),
                    path: "/etc".into(),
                    mode: SnapshotMode::Auto,
                    stop_services: vec![],
                }]
            } else {
                file.updates.targets
            },
            critical_services: if file.updates.critical_services.is_empty() {
                vec!["nosd.service".into(), "nos-agent.service".into()]
            } else {
                file.updates.critical_services
            },
            disk_floor_bytes: file.updates.disk_floor_bytes.unwrap_or(DEFAULT_DISK_FLOOR),
            update_health_url: file.updates.health_url,

            confirm_requires_mfa: file.firewall.confirm_requires_mfa.unwrap_or(false),
            mfa_enrolled: file.firewall.mfa_enrolled.unwrap_or(false),
            firewall_options: file.firewall.options.unwrap_or_default(),

            recovery_mode,
        }
    }

    /// All state rooted under one directory — the test and dev layout.
    pub fn with_root(root: &Path) -> Self {
        let mut config = Self::from_file(ConfigFile::default());
        config.state_dir = root.join("state");
        config.apps_state_dir = root.join("apps-state");
        config.snapshots_dir = root.join("snapshots");
        config.apps_root = root.join("apps");
        config.proxy_snippet_dir = root.join("proxy.d");
        config.log_path = root.join("state/nosd.log");
        config.ruleset_path = root.join("firewall/ruleset.nft");
        config.agent_socket = root.join("agent.sock");
        config.agent_token = root.join("agent.token");
        config.update_targets = vec![UpdateTargetConfig {
            id: "etc".into(),
            path: root.join("etc"),
            mode: SnapshotMode::Auto,
            stop_services: vec![],
        }];
        config.update_health_url = None;
        config.critical_services = vec![];
        config.disk_floor_bytes = 1;
        config
    }

    // -- derived paths (the documented layout) --

    pub fn daemon_lock_path(&self) -> PathBuf {
        self.state_dir.join("nosd.lock")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.apps_state_dir.join("apps.json")
    }

    pub fn events_journal_path(&self) -> PathBuf {
        self.apps_state_dir.join("events.jsonl")
    }

    pub fn tx_index_path(&self) -> PathBuf {
        self.snapshots_dir.join("index.json")
    }

    pub fn catalog_cache_path(&self) -> PathBuf {
        self.state_dir.join("catalog-cache.json")
    }

    pub fn update_state_path(&self) -> PathBuf {
        self.state_dir.join("update/state.json")
    }

    pub fn update_lock_path(&self) -> PathBuf {
        self.state_dir.join("update/lock")
    }

    pub fn firewall_state_path(&self) -> PathBuf {
        self.state_dir.join("firewall.json")
    }

    pub fn app_snapshots_dir(&self) -> PathBuf {
        self.apps_root.join(".snapshots")
    }

    pub fn recovery_dir(&self) -> PathBuf {
        self.state_dir.join("recovery")
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
