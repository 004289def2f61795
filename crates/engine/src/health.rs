// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Health waiting: a plain polling loop with deadline and cancellation.
//!
//! Container health is observed through the agent (`container.status`);
//! HTTP health probes the app's primary port on loopback. An app counts
//! healthy after `healthy_after` consecutive healthy observations.

use crate::error::EngineError;
use nos_agent::AgentClient;
use nos_core::{CancelToken, Clock, HealthKind, HealthSpec};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One service row from `docker compose ps --format json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Health", default)]
    pub health: String,
}

impl ContainerState {
    /// Running, and healthy when the container defines a healthcheck.
    pub fn is_healthy(&self) -> bool {
        self.state == "running" && (self.health.is_empty() || self.health == "healthy")
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// Parse `docker compose ps --format json` output: either one JSON object
/// per line or a single JSON array.
pub fn parse_compose_ps(stdout: &str) -> Vec<ContainerState> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).unwrap_or_default();
    }
    trimmed
        .lines()
        .filter_map(|line| serde_json::from_str(line.trim()).ok())
        .collect()
}

/// Polls health until healthy, deadline, or cancellation.
pub struct HealthWaiter {
    agent: Arc<dyn AgentClient>,
    clock: Arc<dyn Clock>,
}

impl HealthWaiter {
    pub fn new(agent: Arc<dyn AgentClient>, clock: Arc<dyn Clock>) -> Self {
        Self { agent, clock }
    }

    /// Observe the project's containers once.
    pub async fn observe(&self, project: &str) -> Result<Vec<ContainerState>, EngineError> {
        let output = self
            .agent
            .call("container.status", serde_json::json!({ "project": project }))
            .await?;
        Ok(parse_compose_ps(&output.stdout))
    }

    /// Wait until the app is healthy for `healthy_after` consecutive
    /// polls, at `interval_secs` spacing, within `timeout_secs`.
    ///
    /// Cancellation short-circuits with a timeout-kind error so the
    /// caller's rollback path runs.
    pub async fn wait_healthy(
        &self,
        project: &str,
        spec: &HealthSpec,
        http_port: Option<u16>,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        let deadline = self.clock.monotonic() + Duration::from_secs(spec.timeout_secs);
        let interval = Duration::from_secs(spec.interval_secs.max(1));
        let mut consecutive = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::timeout(
                    "cancelled",
                    format!("health wait for {project} cancelled"),
                ));
            }
            if self.clock.monotonic() >= deadline {
                return Err(EngineError::timeout(
                    "health",
                    format!(
                        "{project} not healthy within {}s",
                        spec.timeout_secs
                    ),
                ));
            }

            let healthy = self.poll_once(project, spec, http_port).await;
            if healthy {
                consecutive += 1;
                debug!(project, consecutive, needed = spec.healthy_after, "healthy tick");
                if consecutive >= spec.healthy_after.max(1) {
                    return Ok(());
                }
            } else {
                consecutive = 0;
            }

            tokio::time::sleep(interval).await;
        }
    }

    async fn poll_once(&self, project: &str, spec: &HealthSpec, http_port: Option<u16>) -> bool {
        // Container state gates both kinds: a dead container is never
        // healthy, whatever its HTTP endpoint once said.
        let states = match self.observe(project).await {
            Ok(states) => states,
            Err(e) => {
                debug!(project, "status poll failed: {}", e);
                return false;
            }
        };
        if states.is_empty() || !states.iter().all(ContainerState::is_healthy) {
            return false;
        }

        match spec.kind {
            HealthKind::Container => true,
            HealthKind::Http => {
                let Some(port) = http_port else {
                    return false;
                };
                let path = spec.path.as_deref().unwrap_or("/");
                let url = format!("http://127.0.0.1:{port}{path}");
                match reqwest::Client::new()
                    .get(&url)
                    .timeout(Duration::from_secs(2))
                    .send()
                    .await
                {
                    Ok(response) => response.status().is_success(),
                    Err(e) => {
                        debug!(project, url, "http probe failed: {}", e);
                        false
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod tests;
