// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-phase steps of an app upgrade.
//!
//! The orchestrator prepares data → files → runtime in order; a failure
//! anywhere rolls back in reverse, so files are restored before the data
//! snapshot, and the restart on the originating version happens last.

use super::paths::AppPaths;
use crate::error::EngineError;
use crate::fsutil::{backup_path, write_text_atomic};
use crate::health::HealthWaiter;
use crate::snapshots::SnapshotService;
use crate::txn::TxStep;
use async_trait::async_trait;
use nos_agent::AgentClient;
use nos_core::{CancelToken, HealthSpec, SnapshotRef};
use std::fs;
use std::sync::Arc;

/// Holds the pre-upgrade snapshot; its rollback restores the data tree
/// and restarts the unit on the old configuration.
pub(super) struct DataStep {
    pub snapshots: Arc<SnapshotService>,
    pub agent: Arc<dyn AgentClient>,
    pub paths: AppPaths,
    pub snapshot: SnapshotRef,
}

#[async_trait]
impl TxStep for DataStep {
    fn name(&self) -> &str {
        "data"
    }

    async fn prepare(&mut self) -> Result<(), EngineError> {
        // The snapshot was taken before the orchestrator started; there
        // is nothing to do until a rollback is needed.
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), EngineError> {
        self.snapshots
            .restore(&self.paths.data_dir, &self.snapshot)
            .await?;
        self.agent
            .call(
                "container.compose.up",
                serde_json::json!({
                    "compose_file": self.paths.compose_path.display().to_string(),
                    "project": self.paths.project.clone(),
                }),
            )
            .await?;
        Ok(())
    }
}

/// Stages the newly rendered compose and env files, preserving the live
/// ones as `.backup` siblings until commit.
pub(super) struct FilesStep {
    pub paths: AppPaths,
    pub new_compose: String,
    pub new_env: String,
}

#[async_trait]
impl TxStep for FilesStep {
    fn name(&self) -> &str {
        "files"
    }

    async fn prepare(&mut self) -> Result<(), EngineError> {
        fs::copy(&self.paths.compose_path, backup_path(&self.paths.compose_path))
            .map_err(|e| EngineError::io("stage_backup", e))?;
        if self.paths.env_path.exists() {
            fs::copy(&self.paths.env_path, backup_path(&self.paths.env_path))
                .map_err(|e| EngineError::io("stage_backup", e))?;
        }
        write_text_atomic(&self.paths.compose_path, &self.new_compose)?;
        write_text_atomic(&self.paths.env_path, &self.new_env)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), EngineError> {
        let _ = fs::remove_file(backup_path(&self.paths.compose_path));
        let _ = fs::remove_file(backup_path(&self.paths.env_path));
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), EngineError> {
        let compose_backup = backup_path(&self.paths.compose_path);
        let env_backup = backup_path(&self.paths.env_path);
        if compose_backup.exists() {
            fs::rename(&compose_backup, &self.paths.compose_path)
                .map_err(|e| EngineError::io("rollback_files", e))?;
        }
        if env_backup.exists() {
            fs::rename(&env_backup, &self.paths.env_path)
                .map_err(|e| EngineError::io("rollback_files", e))?;
        }
        Ok(())
    }
}

/// Pulls images, restarts the unit on the new files, and gates on
/// health. Purely transient: nothing to commit or undo — the earlier
/// steps own the reversible state.
pub(super) struct RuntimeStep {
    pub agent: Arc<dyn AgentClient>,
    pub health: HealthWaiter,
    pub paths: AppPaths,
    pub spec: HealthSpec,
    pub http_port: Option<u16>,
    pub cancel: CancelToken,
}

#[async_trait]
impl TxStep for RuntimeStep {
    fn name(&self) -> &str {
        "runtime"
    }

    async fn prepare(&mut self) -> Result<(), EngineError> {
        self.agent
            .call(
                "container.compose.pull",
                serde_json::json!({
                    "compose_file": self.paths.compose_path.display().to_string(),
                    "project": self.paths.project.clone(),
                }),
            )
            .await?;
        self.agent
            .call(
                "container.compose.up",
                serde_json::json!({
                    "compose_file": self.paths.compose_path.display().to_string(),
                    "project": self.paths.project.clone(),
                }),
            )
            .await?;
        self.health
            .wait_healthy(&self.paths.project, &self.spec, self.http_port, &self.cancel)
            .await
    }

    async fn commit(&mut self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}
