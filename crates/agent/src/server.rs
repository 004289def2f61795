// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent socket server.
//!
//! Accepts connections on a Unix stream socket, one spawned task per
//! connection. Each request is authenticated against the shared token,
//! answered from the idempotence cache when the request id was already
//! served, and otherwise dispatched.

use crate::token::{read_token, tokens_match};
use crate::verbs;
use crate::wire::{self, VerbRequest, VerbResponse, DEFAULT_IO_TIMEOUT};
use nos_core::RequestId;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

/// Agent configuration, from environment with fixed defaults.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Unix socket the agent listens on.
    pub socket_path: PathBuf,
    /// Root-only path holding the shared daemon token.
    pub token_path: PathBuf,
    /// Unit reloaded by `proxy.reload`.
    pub proxy_unit: String,
    /// Unit reloaded by `tls.reload`.
    pub tls_unit: String,
    /// Interface managed by `vpn.up` / `vpn.down`.
    pub vpn_interface: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/run/nos/agent.sock"),
            token_path: PathBuf::from("/etc/nos/agent.token"),
            proxy_unit: "caddy.service".into(),
            tls_unit: "caddy.service".into(),
            vpn_interface: "nos0".into(),
        }
    }
}

impl AgentConfig {
    /// Load config, honoring `NOS_AGENT_*` environment overrides.
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("NOS_AGENT_SOCKET") {
            config.socket_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("NOS_AGENT_TOKEN_FILE") {
            config.token_path = PathBuf::from(path);
        }
        if let Ok(unit) = std::env::var("NOS_AGENT_PROXY_UNIT") {
            config.proxy_unit = unit;
        }
        if let Ok(unit) = std::env::var("NOS_AGENT_TLS_UNIT") {
            config.tls_unit = unit;
        }
        if let Ok(iface) = std::env::var("NOS_AGENT_VPN_INTERFACE") {
            config.vpn_interface = iface;
        }
        config
    }
}

/// Recently served requests kept for idempotent replay.
const IDEMPOTENCE_CACHE_SIZE: usize = 128;

#[derive(Default)]
struct ReplayCache {
    order: VecDeque<RequestId>,
    responses: HashMap<RequestId, VerbResponse>,
}

impl ReplayCache {
    fn get(&self, id: &RequestId) -> Option<VerbResponse> {
        self.responses.get(id).cloned()
    }

    fn insert(&mut self, id: RequestId, response: VerbResponse) {
        if self.responses.contains_key(&id) {
            return;
        }
        if self.order.len() >= IDEMPOTENCE_CACHE_SIZE {
            if let Some(evicted) = self.order.pop_front() {
                self.responses.remove(&evicted);
            }
        }
        self.order.push_back(id.clone());
        self.responses.insert(id, response);
    }
}

/// The agent server loop.
pub struct AgentServer {
    config: Arc<AgentConfig>,
    cache: Arc<Mutex<ReplayCache>>,
}

impl AgentServer {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config: Arc::new(config),
            cache: Arc::new(Mutex::new(ReplayCache::default())),
        }
    }

    /// Accept and serve connections until the process exits.
    pub async fn run(&self, listener: UnixListener) {
        info!(socket = %self.config.socket_path.display(), "agent listening");
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let config = Arc::clone(&self.config);
                    let cache = Arc::clone(&self.cache);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &config, &cache).await {
                            match e {
                                wire::ProtocolError::ConnectionClosed => {
                                    debug!("client disconnected")
                                }
                                wire::ProtocolError::Timeout => warn!("connection timeout"),
                                _ => error!("connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    config: &AgentConfig,
    cache: &Mutex<ReplayCache>,
) -> Result<(), wire::ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    let request = wire::read_request(&mut reader, DEFAULT_IO_TIMEOUT).await?;
    let response = handle_request(request, config, cache).await;
    wire::write_response(&mut writer, &response, DEFAULT_IO_TIMEOUT).await
}

async fn handle_request(
    request: VerbRequest,
    config: &AgentConfig,
    cache: &Mutex<ReplayCache>,
) -> VerbResponse {
    let VerbRequest {
        id,
        verb,
        args,
        token,
    } = request;

    let expected = match read_token(&config.token_path) {
        Ok(token) => token,
        Err(e) => {
            error!(request_id = %id, "token file unreadable: {}", e);
            return VerbResponse::err(id, "auth.unavailable", "agent token unavailable");
        }
    };
    if !tokens_match(&expected, &token) {
        warn!(request_id = %id, verb = %verb, "rejected call with bad token");
        return VerbResponse::err(id, "auth.denied", "invalid token");
    }

    // Replay: a retried request id returns the original response without
    // re-executing the verb.
    if let Some(cached) = cache.lock().get(&id) {
        debug!(request_id = %id, verb = %verb, "replaying cached response");
        return cached;
    }

    info!(request_id = %id, verb = %verb, "dispatching verb");
    let outcome = verbs::dispatch(&verb, &args, config).await;
    if let Some(error) = &outcome.error {
        warn!(request_id = %id, verb = %verb, code = %error.code, "verb failed");
    }

    let response = VerbResponse {
        id: id.clone(),
        ok: outcome.is_ok(),
        result: outcome.result,
        error: outcome.error,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        exit_code: outcome.exit_code,
    };
    cache.lock().insert(id, response.clone());
    response
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
