// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON document persistence.
//!
//! Write sequence: serialize to `*.tmp`, fsync the file, rename into place,
//! fsync the parent directory. A crash at any point leaves either the old
//! document or the new one, never a mix.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt document at {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("document at {} is version {found}, newer than supported {supported}", .path.display())]
    NewerVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("lock at {} is held (pid {pid:?})", .path.display())]
    LockHeld { path: PathBuf, pid: Option<u32> },

    #[error("transaction not found: {0}")]
    TxNotFound(String),

    #[error("transaction {tx_id} is {state}, cannot {action}")]
    TxState {
        tx_id: String,
        state: String,
        action: &'static str,
    },
}

/// Save a document atomically: tmp → fsync → rename → fsync dir.
pub fn save_json<T: Serialize>(path: &Path, doc: &T) -> Result<(), StoreError> {
    let parent = path.parent();
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, doc)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    // Make the rename durable across power loss.
    if let Some(parent) = parent {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

/// Load a document, returning `Ok(None)` when the file does not exist.
///
/// A document that exists but fails to parse is a broken invariant:
/// the caller decides whether that is fatal or recoverable.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    let reader = BufReader::new(file);
    match serde_json::from_reader(reader) {
        Ok(doc) => Ok(Some(doc)),
        Err(e) => Err(StoreError::Corrupt {
            path: path.to_owned(),
            message: e.to_string(),
        }),
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
pub fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
