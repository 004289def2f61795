// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slug helpers for filesystem-derived identifiers.

use chrono::{DateTime, Utc};
use std::path::Path;

/// Turn a filesystem path into a flat slug usable as a directory name.
///
/// `/var/lib/nos` → `var-lib-nos`. Non-alphanumeric runs collapse to a
/// single dash; the empty path (or `/`) yields `root`.
pub fn slugify(path: &Path) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for ch in path.to_string_lossy().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if out.is_empty() {
        "root".to_string()
    } else {
        out
    }
}

/// Timestamp slug used in snapshot ids: `20260213-154502`.
pub fn timestamp_slug(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d-%H%M%S").to_string()
}

#[cfg(test)]
#[path = "slug_tests.rs"]
mod tests;
