// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot descriptors for app and update targets.

use crate::id::SnapshotId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a snapshot was materialized on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Read-only subvolume snapshot on a copy-on-write filesystem.
    CowSubvolume,
    /// Gzipped tarball fallback for non-CoW targets.
    Tar,
}

impl std::fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotKind::CowSubvolume => write!(f, "cow_subvolume"),
            SnapshotKind::Tar => write!(f, "tar"),
        }
    }
}

/// A point-in-time copy of a target's data tree.
///
/// The id is a timestamp-derived slug (`<ts>-<tag>`), monotonic within the
/// owning target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub id: SnapshotId,
    pub kind: SnapshotKind,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// e.g. `pre-install`, `pre-upgrade`, `pre-update`.
    pub tag: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SnapshotKind::CowSubvolume).unwrap(),
            "\"cow_subvolume\""
        );
        assert_eq!(serde_json::to_string(&SnapshotKind::Tar).unwrap(), "\"tar\"");
    }
}
