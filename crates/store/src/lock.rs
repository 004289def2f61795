// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive file locks with PID annotation.
//!
//! Locks are advisory flocks: the kernel releases them when the holder
//! dies, so a dead holder never wedges the system. The PID written into
//! the lock file is diagnostic only.

use crate::atomic::StoreError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// An exclusive lock on a file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    // NOTE(lifetime): held to maintain the exclusive flock; released on drop
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Try to acquire the lock without blocking.
    ///
    /// Returns [`StoreError::LockHeld`] (with the holder's PID when
    /// readable) if another process holds it.
    pub fn try_acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            let pid = fs::read_to_string(path)
                .ok()
                .and_then(|s| s.trim().parse::<u32>().ok());
            return Err(StoreError::LockHeld {
                path: path.to_owned(),
                pid,
            });
        }

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    /// Acquire the lock, blocking until it is free.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        file.lock_exclusive()?;

        file.set_len(0)?;
        write!(file, "{}", std::process::id())?;
        file.sync_all()?;

        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
