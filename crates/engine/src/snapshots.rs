// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Uniform snapshot service over CoW subvolumes and tar archives.
//!
//! CoW snapshots go through the agent (`fs.subvolume.*`); tar snapshots
//! are produced in-process with temp-file + rename atomicity. Restores
//! keep a single `rollback-backup` of the prior live tree until the new
//! tree is in place.

use crate::error::EngineError;
use chrono::{DateTime, NaiveDateTime, Utc};
use nos_agent::AgentClient;
use nos_core::{timestamp_slug, Clock, SnapshotId, SnapshotKind, SnapshotRef};
use nos_store::TxIndex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How snapshots are taken for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotMode {
    Cow,
    Tar,
    /// CoW when the target sits on a copy-on-write filesystem, else tar.
    Auto,
}

/// A snapshot-able directory tree.
#[derive(Debug, Clone)]
pub struct SnapshotTarget {
    pub id: String,
    /// The live tree.
    pub path: PathBuf,
    pub mode: SnapshotMode,
    /// Where this target's snapshots live.
    pub snapshot_dir: PathBuf,
}

/// Result of a prune pass.
#[derive(Debug, Clone, Default)]
pub struct PruneOutcome {
    pub kept: Vec<SnapshotRef>,
    pub deleted: Vec<SnapshotId>,
}

/// Create/list/restore/delete over both snapshot kinds.
pub struct SnapshotService {
    agent: Arc<dyn AgentClient>,
    index: TxIndex,
    clock: Arc<dyn Clock>,
}

impl SnapshotService {
    pub fn new(agent: Arc<dyn AgentClient>, index: TxIndex, clock: Arc<dyn Clock>) -> Self {
        Self {
            agent,
            index,
            clock,
        }
    }

    /// Whether a path sits on a CoW filesystem (asked through the agent).
    pub async fn is_cow(&self, path: &Path) -> Result<bool, EngineError> {
        let output = self
            .agent
            .call(
                "fs.is_cow",
                serde_json::json!({ "path": path.display().to_string() }),
            )
            .await?;
        if let Some(cow) = output.result.get("cow").and_then(|v| v.as_bool()) {
            return Ok(cow);
        }
        Ok(output.stdout.trim() == "btrfs")
    }

    /// Create a snapshot of the target, tagged (`pre-upgrade`, …).
    ///
    /// The snapshot id is monotonic within the target: timestamp slug plus
    /// the tag, disambiguated when two snapshots land in the same second.
    pub async fn create(
        &self,
        target: &SnapshotTarget,
        tag: &str,
    ) -> Result<SnapshotRef, EngineError> {
        let kind = match target.mode {
            SnapshotMode::Cow => SnapshotKind::CowSubvolume,
            SnapshotMode::Tar => SnapshotKind::Tar,
            SnapshotMode::Auto => {
                if self.is_cow(&target.path).await? {
                    SnapshotKind::CowSubvolume
                } else {
                    SnapshotKind::Tar
                }
            }
        };

        fs::create_dir_all(&target.snapshot_dir).map_err(|e| EngineError::io("snapshot_dir", e))?;

        let created_at = self.clock.now();
        let id = self.unique_id(target, tag, created_at, kind);
        let snapshot_path = match kind {
            SnapshotKind::CowSubvolume => target.snapshot_dir.join(id.as_str()),
            SnapshotKind::Tar => target.snapshot_dir.join(format!("{}.tar.gz", id)),
        };

        match kind {
            SnapshotKind::CowSubvolume => {
                self.agent
                    .call(
                        "fs.subvolume.snapshot",
                        serde_json::json!({
                            "source": target.path.display().to_string(),
                            "dest": snapshot_path.display().to_string(),
                            "readonly": true,
                        }),
                    )
                    .await?;
            }
            SnapshotKind::Tar => {
                let source = target.path.clone();
                let dest = snapshot_path.clone();
                tokio::task::spawn_blocking(move || create_tarball(&source, &dest))
                    .await
                    .map_err(|e| EngineError::external("snapshot_task", e.to_string()))??;
            }
        }

        info!(target = %target.id, id = %id, kind = %kind, "snapshot created");
        Ok(SnapshotRef {
            id,
            kind,
            path: snapshot_path,
            created_at,
            tag: tag.to_string(),
        })
    }

    /// Restore a snapshot over the live tree.
    pub async fn restore(
        &self,
        live_path: &Path,
        snapshot: &SnapshotRef,
    ) -> Result<(), EngineError> {
        match snapshot.kind {
            SnapshotKind::CowSubvolume => self.restore_cow(live_path, snapshot).await,
            SnapshotKind::Tar => self.restore_tar(live_path, snapshot).await,
        }
    }

    /// CoW restore: park the live subvolume as a rollback-backup, make a
    /// writable clone of the snapshot live, then drop the backup.
    async fn restore_cow(&self, live_path: &Path, snapshot: &SnapshotRef) -> Result<(), EngineError> {
        let backup = rollback_backup_path(live_path);
        let live_existed = live_path.exists();

        if live_existed {
            fs::rename(live_path, &backup).map_err(|e| EngineError::io("restore_park", e))?;
        }

        let clone = self
            .agent
            .call(
                "fs.subvolume.snapshot",
                serde_json::json!({
                    "source": snapshot.path.display().to_string(),
                    "dest": live_path.display().to_string(),
                    "readonly": false,
                }),
            )
            .await;

        match clone {
            Ok(_) => {
                if live_existed {
                    // Prior live tree is only dropped after the restore
                    // landed; a failure here leaves the backup for manual
                    // cleanup but the restore stands.
                    if let Err(e) = self
                        .agent
                        .call(
                            "fs.subvolume.delete",
                            serde_json::json!({ "path": backup.display().to_string() }),
                        )
                        .await
                    {
                        warn!(backup = %backup.display(), "dropping rollback-backup failed: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                if live_existed {
                    if let Err(rename_err) = fs::rename(&backup, live_path) {
                        warn!(
                            backup = %backup.display(),
                            "restoring parked live tree failed: {}", rename_err
                        );
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Tar restore: extract into a staging directory beside the live tree,
    /// then rename-swap; rename back on failure.
    async fn restore_tar(&self, live_path: &Path, snapshot: &SnapshotRef) -> Result<(), EngineError> {
        let staging = staging_restore_path(live_path);
        let backup = rollback_backup_path(live_path);

        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| EngineError::io("restore_staging", e))?;
        }
        fs::create_dir_all(&staging).map_err(|e| EngineError::io("restore_staging", e))?;

        let archive = snapshot.path.clone();
        let staging_clone = staging.clone();
        tokio::task::spawn_blocking(move || extract_tarball(&archive, &staging_clone))
            .await
            .map_err(|e| EngineError::external("restore_task", e.to_string()))??;

        let live_existed = live_path.exists();
        if live_existed {
            fs::rename(live_path, &backup).map_err(|e| EngineError::io("restore_park", e))?;
        }

        match fs::rename(&staging, live_path) {
            Ok(()) => {
                if live_existed {
                    if let Err(e) = fs::remove_dir_all(&backup) {
                        warn!(backup = %backup.display(), "dropping rollback-backup failed: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                if live_existed {
                    if let Err(rename_err) = fs::rename(&backup, live_path) {
                        warn!(
                            backup = %backup.display(),
                            "restoring parked live tree failed: {}", rename_err
                        );
                    }
                }
                Err(EngineError::io("restore_swap", e))
            }
        }
    }

    /// Delete one snapshot.
    pub async fn delete(&self, snapshot: &SnapshotRef) -> Result<(), EngineError> {
        match snapshot.kind {
            SnapshotKind::CowSubvolume => {
                self.agent
                    .call(
                        "fs.subvolume.delete",
                        serde_json::json!({ "path": snapshot.path.display().to_string() }),
                    )
                    .await?;
            }
            SnapshotKind::Tar => {
                fs::remove_file(&snapshot.path).map_err(|e| EngineError::io("snapshot_delete", e))?;
            }
        }
        Ok(())
    }

    /// Delete oldest snapshots beyond `keep_n`.
    ///
    /// Snapshots referenced by a non-committed transaction are never
    /// deleted, even when they fall past the retention window.
    pub async fn prune(
        &self,
        snapshots: &[SnapshotRef],
        keep_n: usize,
    ) -> Result<PruneOutcome, EngineError> {
        let pinned = self.index.pinned_snapshots()?;

        let mut sorted: Vec<SnapshotRef> = snapshots.to_vec();
        sorted.sort_by_key(|s| s.created_at);

        let mut outcome = PruneOutcome::default();
        let excess = sorted.len().saturating_sub(keep_n);
        for (i, snapshot) in sorted.into_iter().enumerate() {
            let prunable = i < excess && !pinned.contains(&snapshot.id);
            if prunable {
                match self.delete(&snapshot).await {
                    Ok(()) => {
                        debug!(id = %snapshot.id, "pruned snapshot");
                        outcome.deleted.push(snapshot.id);
                    }
                    Err(e) => {
                        warn!(id = %snapshot.id, "prune failed, keeping: {}", e);
                        outcome.kept.push(snapshot);
                    }
                }
            } else {
                outcome.kept.push(snapshot);
            }
        }
        Ok(outcome)
    }

    /// Enumerate snapshots present in a target's snapshot directory.
    pub fn list(&self, target: &SnapshotTarget) -> Result<Vec<SnapshotRef>, EngineError> {
        let mut out = Vec::new();
        let entries = match fs::read_dir(&target.snapshot_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(EngineError::io("snapshot_list", e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| EngineError::io("snapshot_list", e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let (id, kind) = match name.strip_suffix(".tar.gz") {
                Some(stem) => (stem.to_string(), SnapshotKind::Tar),
                None => (name.clone(), SnapshotKind::CowSubvolume),
            };
            let Some((created_at, tag)) = parse_snapshot_id(&id) else {
                continue; // foreign file in the snapshot dir
            };
            out.push(SnapshotRef {
                id: SnapshotId::new(id),
                kind,
                path: entry.path(),
                created_at,
                tag,
            });
        }

        out.sort_by_key(|s| s.created_at);
        Ok(out)
    }

    fn unique_id(
        &self,
        target: &SnapshotTarget,
        tag: &str,
        created_at: DateTime<Utc>,
        kind: SnapshotKind,
    ) -> SnapshotId {
        let base = format!("{}-{}", timestamp_slug(created_at), tag);
        let exists = |candidate: &str| {
            let path = match kind {
                SnapshotKind::CowSubvolume => target.snapshot_dir.join(candidate),
                SnapshotKind::Tar => target.snapshot_dir.join(format!("{candidate}.tar.gz")),
            };
            path.exists()
        };

        if !exists(&base) {
            return SnapshotId::new(base);
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !exists(&candidate) {
                return SnapshotId::new(candidate);
            }
            n += 1;
        }
    }
}

/// `<path>.rollback-backup` sibling.
fn rollback_backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".rollback-backup");
    path.with_file_name(name)
}

/// `<path>.restore-tmp` staging sibling.
fn staging_restore_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".restore-tmp");
    path.with_file_name(name)
}

/// Parse `20260101-154502-pre-upgrade` into its timestamp and tag.
fn parse_snapshot_id(id: &str) -> Option<(DateTime<Utc>, String)> {
    if id.len() < 16 {
        return None;
    }
    let (ts, rest) = id.split_at(15);
    let tag = rest.strip_prefix('-')?;
    let naive = NaiveDateTime::parse_from_str(ts, "%Y%m%d-%H%M%S").ok()?;
    Some((naive.and_utc(), tag.to_string()))
}

/// Build a gzipped tarball of `source` at `dest` atomically.
fn create_tarball(source: &Path, dest: &Path) -> Result<(), EngineError> {
    let tmp = dest.with_extension("tmp");
    {
        let file = fs::File::create(&tmp).map_err(|e| EngineError::io("tar_create", e))?;
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        builder
            .append_dir_all(".", source)
            .map_err(|e| EngineError::io("tar_append", e))?;
        let encoder = builder
            .into_inner()
            .map_err(|e| EngineError::io("tar_finish", e))?;
        let file = encoder.finish().map_err(|e| EngineError::io("tar_finish", e))?;
        file.sync_all().map_err(|e| EngineError::io("tar_sync", e))?;
    }
    fs::rename(&tmp, dest).map_err(|e| EngineError::io("tar_rename", e))?;
    Ok(())
}

/// Extract a gzipped tarball into `dest`.
fn extract_tarball(archive: &Path, dest: &Path) -> Result<(), EngineError> {
    let file = fs::File::open(archive).map_err(|e| EngineError::io("tar_open", e))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(|e| EngineError::io("tar_unpack", e))?;
    Ok(())
}

#[cfg(test)]
#[path = "snapshots_tests.rs"]
mod tests;
