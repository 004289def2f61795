// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog resolution: built-in + verified remote sources, merged LWW.
//!
//! Remote sources are fetched over HTTP(S), parsed as JSON with a YAML
//! fallback, digest-checked, then merged last-writer-wins by id with the
//! built-in catalog first. A rejected source never disturbs the previous
//! merge: its last good document is reused. The merged result is cached
//! atomically on disk and reused in-process for five minutes.

use crate::source::SourceConfig;
use async_trait::async_trait;
use nos_core::catalog::CATALOG_DOC_VERSION;
use nos_core::{CatalogDocument, CatalogEntry};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// In-process reuse window for the merged catalog.
pub const MERGE_TTL: Duration = Duration::from_secs(5 * 60);

/// Built-in catalog compiled into the daemon; always present.
const BUILTIN_CATALOG: &str = include_str!("../builtin/catalog.json");

/// Errors from the resolver.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("store error: {0}")]
    Store(#[from] nos_store::StoreError),

    #[error("built-in catalog is invalid: {0}")]
    Builtin(String),
}

/// Transport seam so tests can script fetches.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Production fetcher over HTTPS.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let response = response.error_for_status().map_err(|e| e.to_string())?;
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }
}

/// Outcome of a sync pass, consumed by the daemon for event emission.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Sources that merged cleanly this pass.
    pub sources_ok: u32,
    /// Total entries in the merged catalog.
    pub entries: u32,
    /// Rejected sources with reasons (fetch, parse, or digest failure).
    pub rejected: Vec<(String, String)>,
}

struct ResolverState {
    merged: Option<CatalogDocument>,
    merged_at: Option<Instant>,
    /// Last successfully verified document per source name.
    last_good: HashMap<String, CatalogDocument>,
}

/// The catalog resolver.
pub struct CatalogResolver {
    builtin: CatalogDocument,
    sources: Vec<SourceConfig>,
    cache_path: PathBuf,
    fetcher: Box<dyn SourceFetcher>,
    state: Mutex<ResolverState>,
}

impl CatalogResolver {
    pub fn new(
        sources: Vec<SourceConfig>,
        cache_path: impl Into<PathBuf>,
        fetcher: Box<dyn SourceFetcher>,
    ) -> Result<Self, CatalogError> {
        let builtin: CatalogDocument =
            serde_json::from_str(BUILTIN_CATALOG).map_err(|e| CatalogError::Builtin(e.to_string()))?;

        Ok(Self {
            builtin,
            sources,
            cache_path: cache_path.into(),
            fetcher,
            state: Mutex::new(ResolverState {
                merged: None,
                merged_at: None,
                last_good: HashMap::new(),
            }),
        })
    }

    /// Whether the in-process merge is younger than [`MERGE_TTL`].
    pub fn is_fresh(&self) -> bool {
        self.state
            .lock()
            .merged_at
            .is_some_and(|at| at.elapsed() < MERGE_TTL)
    }

    /// The current merged catalog: in-process merge, else the disk cache,
    /// else the built-in alone. Never fails.
    pub fn merged(&self) -> CatalogDocument {
        if let Some(merged) = self.state.lock().merged.clone() {
            return merged;
        }

        match nos_store::load_json::<CatalogDocument>(&self.cache_path) {
            Ok(Some(doc)) if doc.version <= CATALOG_DOC_VERSION => {
                debug!(path = %self.cache_path.display(), "serving catalog from disk cache");
                return doc;
            }
            Ok(Some(doc)) => {
                warn!(
                    found = doc.version,
                    supported = CATALOG_DOC_VERSION,
                    "catalog cache is newer than this daemon, ignoring"
                );
            }
            Ok(None) => {}
            Err(e) => {
                warn!("catalog cache unreadable, falling back to built-in: {}", e);
            }
        }

        self.builtin.clone()
    }

    /// Look up one entry in the merged catalog.
    pub fn entry(&self, id: &str) -> Option<CatalogEntry> {
        self.merged().entries.into_iter().find(|e| e.id == id)
    }

    /// Fetch and merge all remote sources.
    ///
    /// Each source failure (fetch, parse, digest mismatch) is recorded in
    /// the report and the source's last good document is retained.
    pub async fn sync(&self) -> Result<SyncReport, CatalogError> {
        let mut report = SyncReport::default();
        let mut fetched: Vec<(String, CatalogDocument)> = Vec::new();

        for source in &self.sources {
            match self.fetch_source(source).await {
                Ok(doc) => {
                    report.sources_ok += 1;
                    fetched.push((source.name.clone(), doc));
                }
                Err(reason) => {
                    warn!(source = %source.name, %reason, "catalog source rejected");
                    report.rejected.push((source.name.clone(), reason));
                    let last_good = self.state.lock().last_good.get(&source.name).cloned();
                    if let Some(doc) = last_good {
                        fetched.push((source.name.clone(), doc));
                    }
                }
            }
        }

        let merged = merge(&self.builtin, fetched.iter().map(|(_, doc)| doc));
        report.entries = merged.entries.len() as u32;

        nos_store::save_json(&self.cache_path, &merged)?;

        {
            let mut state = self.state.lock();
            for (name, doc) in fetched {
                state.last_good.insert(name, doc);
            }
            state.merged = Some(merged);
            state.merged_at = Some(Instant::now());
        }

        info!(
            entries = report.entries,
            sources_ok = report.sources_ok,
            rejected = report.rejected.len(),
            "catalog synced"
        );
        Ok(report)
    }

    async fn fetch_source(&self, source: &SourceConfig) -> Result<CatalogDocument, String> {
        let bytes = self.fetcher.fetch(&source.url).await?;

        if let Some(declared) = &source.digest {
            let actual = hex_sha256(&bytes);
            if !actual.eq_ignore_ascii_case(declared.trim()) {
                return Err(format!(
                    "digest mismatch: declared {}, computed {}",
                    declared, actual
                ));
            }
        }

        let doc = parse_document(&bytes)?;
        if doc.version > CATALOG_DOC_VERSION {
            return Err(format!(
                "document version {} is newer than supported {}",
                doc.version, CATALOG_DOC_VERSION
            ));
        }
        Ok(doc)
    }
}

/// Parse a catalog document: structured JSON preferred, YAML-flavored
/// text form as fallback.
fn parse_document(bytes: &[u8]) -> Result<CatalogDocument, String> {
    match serde_json::from_slice::<CatalogDocument>(bytes) {
        Ok(doc) => Ok(doc),
        Err(json_err) => serde_yaml::from_slice::<CatalogDocument>(bytes)
            .map_err(|yaml_err| format!("not JSON ({json_err}) nor YAML ({yaml_err})")),
    }
}

/// Merge: built-in first, then each source in order; last writer wins by id.
fn merge<'a>(
    builtin: &CatalogDocument,
    sources: impl Iterator<Item = &'a CatalogDocument>,
) -> CatalogDocument {
    let mut by_id: Vec<CatalogEntry> = builtin.entries.clone();

    for doc in sources {
        for entry in &doc.entries {
            match by_id.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry.clone(),
                None => by_id.push(entry.clone()),
            }
        }
    }

    CatalogDocument {
        version: CATALOG_DOC_VERSION,
        entries: by_id,
    }
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
