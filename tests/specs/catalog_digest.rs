// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A remote source with a wrong digest is rejected: the cache is
//! unchanged, previous merged state is retained, and the rejection is
//! surfaced as an event naming the source.

use super::prelude::*;
use nos_catalog::SourceConfig;

fn remote_doc(id: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "version": 1,
        "entries": [{
            "id": id,
            "version": "9.9.9",
            "compose_template": "services: {}\n",
        }]
    }))
    .unwrap()
}

#[tokio::test]
async fn digest_mismatch_rejects_source_and_keeps_state() {
    let s = specs_with(|config| {
        config.catalog_sources = vec![SourceConfig {
            name: "community".into(),
            url: "https://apps.example.org/catalog.json".into(),
            digest: Some("deadbeefdeadbeef".into()), // wrong on purpose
        }];
    })
    .await;
    s.fetcher.set(
        "https://apps.example.org/catalog.json",
        Ok(remote_doc("jellyfin")),
    );

    let cache_before = std::fs::read(s.core.config.catalog_cache_path()).unwrap();

    let report = s.core.sync_catalog().await.unwrap();
    assert_eq!(report.sources_ok, 0);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0, "community");

    // Resolver still serves the previously merged state; the rejected
    // source contributed nothing.
    assert!(s.core.resolver.entry("whoami").is_some());
    assert!(s.core.resolver.entry("jellyfin").is_none());

    // The re-written cache carries the same entries as before
    let cache_after: nos_core::CatalogDocument =
        serde_json::from_slice(&std::fs::read(s.core.config.catalog_cache_path()).unwrap())
            .unwrap();
    let before: nos_core::CatalogDocument = serde_json::from_slice(&cache_before).unwrap();
    let ids = |doc: &nos_core::CatalogDocument| {
        let mut ids: Vec<String> = doc.entries.iter().map(|e| e.id.clone()).collect();
        ids.sort();
        ids
    };
    assert_eq!(ids(&cache_after), ids(&before));

    // catalog.source.rejected names the source
    let records = s.core.bus.recent(None, 100);
    let rejected = records
        .iter()
        .find(|r| r.type_tag == "catalog.source.rejected")
        .expect("rejection event");
    assert_eq!(rejected.target.as_deref(), Some("community"));
}

#[tokio::test]
async fn corrected_digest_is_accepted_on_the_next_sync() {
    use sha2::{Digest, Sha256};

    let bytes = remote_doc("jellyfin");
    let digest = format!("{:x}", Sha256::digest(&bytes));

    let s = specs_with(|config| {
        config.catalog_sources = vec![SourceConfig {
            name: "community".into(),
            url: "https://apps.example.org/catalog.json".into(),
            digest: Some(digest),
        }];
    })
    .await;
    s.fetcher
        .set("https://apps.example.org/catalog.json", Ok(bytes));

    let report = s.core.sync_catalog().await.unwrap();
    assert_eq!(report.sources_ok, 1);
    assert!(s.core.resolver.entry("jellyfin").is_some());
}
