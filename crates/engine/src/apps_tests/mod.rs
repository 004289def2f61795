// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::events::recording::RecordingSink;
use crate::snapshots::SnapshotService;
use async_trait::async_trait;
use nos_agent::client::fake::{FakeAgent, FakeReply};
use nos_catalog::{CatalogResolver, SourceFetcher};
use nos_core::{SystemClock, TxResult};

mod delete;
mod install;
mod lifecycle;
mod rollback_op;
mod upgrade;

/// Fetcher that never succeeds; the tests drive the resolver entirely
/// through the pre-seeded disk cache.
struct NullFetcher;

#[async_trait]
impl SourceFetcher for NullFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, String> {
        Err("no network in tests".into())
    }
}

pub(super) struct Harness {
    pub dir: tempfile::TempDir,
    pub manager: AppManager,
    pub agent: Arc<FakeAgent>,
    pub events: RecordingSink,
    pub index: TxIndex,
}

/// Catalog entry used across the suite: container health with a short
/// timeout so failure paths do not stall the tests.
fn test_catalog_json() -> serde_json::Value {
    serde_json::json!({
        "version": 1,
        "entries": [{
            "id": "whoami",
            "version": "1.0.0",
            "compose_template": "services:\n  whoami:\n    image: traefik/whoami:v1.10\n    ports:\n      - \"${PORT}:80\"\n",
            "schema": {
                "type": "object",
                "properties": {
                    "PORT": { "type": "string", "pattern": "^[0-9]{1,5}$" }
                },
                "additionalProperties": true
            },
            "defaults": {
                "env": { "PORT": "8080" },
                "ports": [ { "host": 8080, "container": 80, "proto": "tcp" } ]
            },
            "health": {
                "kind": "container",
                "interval_secs": 1,
                "healthy_after": 1,
                "timeout_secs": 2
            },
            "needs_privileged": false
        }]
    })
}

pub(super) fn harness() -> Harness {
    harness_with_keep(5)
}

pub(super) fn harness_with_keep(keep_snapshots: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();

    let cache_path = dir.path().join("catalog-cache.json");
    std::fs::write(
        &cache_path,
        serde_json::to_vec(&test_catalog_json()).unwrap(),
    )
    .unwrap();
    let resolver =
        Arc::new(CatalogResolver::new(vec![], &cache_path, Box::new(NullFetcher)).unwrap());

    let agent = Arc::new(FakeAgent::new());
    agent.default_reply(
        "fs.is_cow",
        FakeReply::ok_with_result(serde_json::json!({"cow": false})),
    );
    agent.default_reply(
        "container.status",
        FakeReply::ok_with_stdout(
            serde_json::json!({"State": "running", "Health": ""}).to_string(),
        ),
    );

    let index = TxIndex::new(dir.path().join("index.json"));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let snapshots = Arc::new(SnapshotService::new(
        Arc::clone(&agent) as Arc<dyn AgentClient>,
        index.clone(),
        Arc::clone(&clock),
    ));

    let events = RecordingSink::new();
    let config = AppManagerConfig {
        registry_path: dir.path().join("apps.json"),
        apps_root: dir.path().join("apps"),
        snapshots_dir: dir.path().join("apps/.snapshots"),
        proxy_snippet_dir: dir.path().join("proxy.d"),
        keep_snapshots,
    };

    let manager = AppManager::new(
        config,
        resolver,
        snapshots,
        Arc::clone(&agent) as Arc<dyn AgentClient>,
        index.clone(),
        clock,
        Arc::new(events.clone()),
    );

    Harness {
        dir,
        manager,
        agent,
        events,
        index,
    }
}

pub(super) fn port_params(port: &str) -> BTreeMap<String, serde_json::Value> {
    let mut params = BTreeMap::new();
    params.insert("PORT".to_string(), serde_json::json!(port));
    params
}

pub(super) fn mark_unhealthy(agent: &FakeAgent) {
    agent.default_reply(
        "container.status",
        FakeReply::ok_with_stdout(
            serde_json::json!({"State": "exited", "Health": ""}).to_string(),
        ),
    );
}

pub(super) fn last_tx_result(harness: &Harness) -> TxResult {
    harness.index.list().unwrap().last().unwrap().result
}

#[test]
fn params_digest_is_stable_and_sensitive() {
    let a = params_digest("1.0.0", &port_params("8080"));
    let b = params_digest("1.0.0", &port_params("8080"));
    let c = params_digest("1.0.0", &port_params("9090"));
    let d = params_digest("1.1.0", &port_params("8080"));

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_ne!(a, d);
}
