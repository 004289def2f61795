// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem helpers for rendered artifacts.
//!
//! Rendered files (compose, env, rulesets, proxy snippets) are staged and
//! renamed into place so a crash never leaves a half-written file live.

use crate::error::EngineError;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Write text atomically: staging sibling → fsync → rename.
pub fn write_text_atomic(path: &Path, content: &str) -> Result<(), EngineError> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::fatal("fs", format!("no parent for {}", path.display())))?;
    fs::create_dir_all(parent).map_err(|e| EngineError::io("fs_mkdir", e))?;

    let staged = staging_path(path);
    {
        let mut file = File::create(&staged).map_err(|e| EngineError::io("fs_stage", e))?;
        file.write_all(content.as_bytes())
            .map_err(|e| EngineError::io("fs_stage", e))?;
        file.sync_all().map_err(|e| EngineError::io("fs_sync", e))?;
    }
    fs::rename(&staged, path).map_err(|e| EngineError::io("fs_rename", e))?;
    Ok(())
}

/// Staging sibling for a path: `compose.yml` → `compose.yml.staged`.
pub fn staging_path(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".staged");
    path.with_file_name(name)
}

/// Backup sibling for a path: `compose.yml` → `compose.yml.backup`.
pub fn backup_path(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".backup");
    path.with_file_name(name)
}
