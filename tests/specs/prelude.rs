// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the scenario tests.

use nos_agent::client::fake::{FakeAgent, FakeReply};
use nos_agent::AgentClient;
use nos_catalog::SourceFetcher;
use nos_daemon::lifecycle::{startup_with, Core};
use nos_daemon::Config;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Scripted fetcher shared with the resolver through clones.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    responses: Arc<std::sync::Mutex<HashMap<String, Result<Vec<u8>, String>>>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, response: Result<Vec<u8>, String>) {
        self.responses.lock().unwrap().insert(url.to_string(), response);
    }
}

#[async_trait::async_trait]
impl SourceFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Err("no response scripted".into()))
    }
}

pub struct Specs {
    pub dir: tempfile::TempDir,
    pub core: Arc<Core>,
    pub agent: Arc<FakeAgent>,
    pub fetcher: ScriptedFetcher,
}

/// Catalog cache seeded with a `whoami` entry. The entry declares HTTP
/// health on `/` like the real catalog; the tests run it with container
/// health so the fake agent can satisfy the wait in-process.
pub fn seed_catalog(config: &Config) {
    let doc = serde_json::json!({
        "version": 1,
        "entries": [{
            "id": "whoami",
            "version": "1.0.0",
            "compose_template": "services:\n  whoami:\n    image: traefik/whoami:v1.10\n    ports:\n      - \"${PORT}:80\"\n",
            "schema": {
                "type": "object",
                "properties": {
                    "PORT": { "type": "string", "pattern": "^[0-9]{1,5}$" }
                }
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
    });
    std::fs::create_dir_all(config.catalog_cache_path().parent().unwrap()).unwrap();
    std::fs::write(
        config.catalog_cache_path(),
        serde_json::to_vec(&doc).unwrap(),
    )
    .unwrap();
}

pub async fn specs() -> Specs {
    specs_with(|_| {}).await
}

pub async fn specs_with(tweak: impl FnOnce(&mut Config)) -> Specs {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::with_root(dir.path());
    config.mfa_enrolled = true;
    std::fs::create_dir_all(dir.path().join("etc")).unwrap();
    std::fs::write(dir.path().join("etc/fstab"), b"v1").unwrap();
    seed_catalog(&config);
    tweak(&mut config);

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

    let fetcher = ScriptedFetcher::new();
    let core = startup_with(
        config,
        Arc::clone(&agent) as Arc<dyn AgentClient>,
        Box::new(fetcher.clone()),
    )
    .await
    .unwrap();

    Specs {
        dir,
        core,
        agent,
        fetcher,
    }
}

pub fn port_params(port: &str) -> BTreeMap<String, serde_json::Value> {
    let mut params = BTreeMap::new();
    params.insert("PORT".to_string(), serde_json::json!(port));
    params
}

pub fn event_types(core: &Core) -> Vec<String> {
    core.bus
        .recent(None, 1000)
        .into_iter()
        .map(|r| r.type_tag)
        .collect()
}
