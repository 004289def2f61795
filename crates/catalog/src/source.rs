// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote catalog source configuration.

use serde::{Deserialize, Serialize};

/// A configured remote catalog source.
///
/// Sources are merged after the built-in catalog, in configured order;
/// later sources win on id collisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Short name used in events and logs.
    pub name: String,
    /// HTTP(S) URL of the catalog document.
    pub url: String,
    /// Optional sha256 hex digest of the raw document bytes. When set,
    /// a mismatch rejects the source and the previous merge is retained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_optional() {
        let source: SourceConfig = serde_json::from_str(
            r#"{"name": "community", "url": "https://apps.example.org/catalog.json"}"#,
        )
        .unwrap();
        assert!(source.digest.is_none());
    }
}
