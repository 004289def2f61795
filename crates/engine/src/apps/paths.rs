// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-app filesystem layout under the apps root.
//!
//! ```text
//! /srv/apps/<id>/config/compose.yml
//! /srv/apps/<id>/config/.env
//! /srv/apps/<id>/data            (CoW subvolume when supported)
//! /srv/apps/.snapshots/<id>/<ts>-<tag>
//! ```

use std::path::{Path, PathBuf};

/// Resolved paths for one app.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub app_dir: PathBuf,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub compose_path: PathBuf,
    pub env_path: PathBuf,
    pub snapshot_dir: PathBuf,
    /// Compose project name: `nos-app-<id>`.
    pub project: String,
}

impl AppPaths {
    pub fn new(apps_root: &Path, snapshots_dir: &Path, id: &str) -> Self {
        let app_dir = apps_root.join(id);
        let config_dir = app_dir.join("config");
        Self {
            compose_path: config_dir.join("compose.yml"),
            env_path: config_dir.join(".env"),
            data_dir: app_dir.join("data"),
            snapshot_dir: snapshots_dir.join(id),
            project: format!("nos-app-{id}"),
            config_dir,
            app_dir,
        }
    }
}
