// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Renders the four install artifacts: compose file, env file, optional
//! reverse-proxy snippet, and the declared ports/urls.
//!
//! Security defaults for unprivileged apps are injected into every
//! service in a fixed key order so compose diffs stay minimal.

use crate::template::{expand, merge_env};
use nos_core::catalog::{ResourceLimits, VolumeSpec};
use nos_core::{CatalogEntry, PortMapping};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Fallback resource caps for unprivileged services that declare none.
const DEFAULT_CPU_CAP: f64 = 1.0;
const DEFAULT_MEM_CAP: &str = "512m";

/// Reverse-proxy port preference order.
const PROXY_PORT_PREFERENCE: &[u16] = &[80, 8080, 3000];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("compose template for {id} is not valid YAML after substitution: {message}")]
    InvalidCompose { id: String, message: String },

    #[error("compose template for {id} has no services mapping")]
    NoServices { id: String },

    #[error("structured param {key} is invalid: {message}")]
    BadStructuredParam { key: String, message: String },
}

/// Paths substituted into templates as `${CONFIG_DIR}` / `${DATA_DIR}`.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub app_id: String,
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
}

/// The rendered artifacts for one app.
#[derive(Debug, Clone)]
pub struct RenderedApp {
    pub compose_yaml: String,
    pub env_file: String,
    /// Reverse-proxy snippet body, when the app has an HTTP-looking port.
    pub proxy_snippet: Option<String>,
    /// Deterministic snippet filename: `app-<id>`.
    pub proxy_snippet_name: String,
    pub ports: Vec<PortMapping>,
    pub urls: Vec<String>,
}

/// Render an entry with validated params into its artifacts.
pub fn render_app(
    entry: &CatalogEntry,
    params: &BTreeMap<String, serde_json::Value>,
    ctx: &RenderContext,
) -> Result<RenderedApp, RenderError> {
    let mut env = merge_env(&entry.defaults.env, params);
    env.insert(
        "CONFIG_DIR".to_string(),
        ctx.config_dir.display().to_string(),
    );
    env.insert("DATA_DIR".to_string(), ctx.data_dir.display().to_string());

    let ports = structured_param(params, "_ports", &entry.defaults.ports)?;
    let volumes: Vec<VolumeSpec> = structured_param(params, "_volumes", &entry.defaults.volumes)?;
    let resources: ResourceLimits =
        structured_param_single(params, "_resources", &entry.defaults.resources)?;

    let compose_text = expand(&entry.compose_template, &env);
    let mut compose: Value =
        serde_yaml::from_str(&compose_text).map_err(|e| RenderError::InvalidCompose {
            id: entry.id.clone(),
            message: e.to_string(),
        })?;

    let services = compose
        .get_mut("services")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| RenderError::NoServices {
            id: entry.id.clone(),
        })?;

    if !entry.needs_privileged {
        let read_only_ok = volumes.iter().all(|v| v.read_only);
        for (_name, service) in services.iter_mut() {
            if let Some(service) = service.as_mapping_mut() {
                inject_security_defaults(service, read_only_ok, &resources);
            }
        }
    }

    let compose_yaml =
        serde_yaml::to_string(&compose).map_err(|e| RenderError::InvalidCompose {
            id: entry.id.clone(),
            message: e.to_string(),
        })?;

    let env_file = render_env_file(&env);
    let proxy_port = pick_proxy_port(&ports);
    let proxy_snippet = proxy_port.map(|port| proxy_snippet(&entry.id, port));

    let mut urls: Vec<String> = Vec::new();
    if proxy_port.is_some() {
        urls.push(format!("/apps/{}/", entry.id));
    }
    for port in &ports {
        urls.push(format!("http://localhost:{}", port.host));
    }

    Ok(RenderedApp {
        compose_yaml,
        env_file,
        proxy_snippet,
        proxy_snippet_name: format!("app-{}", entry.id),
        ports,
        urls,
    })
}

/// Inject hardening keys into a service mapping, skipping any the
/// template already sets. Key order is fixed: security_opt, read_only,
/// cpus, mem_limit.
fn inject_security_defaults(service: &mut Mapping, read_only_ok: bool, resources: &ResourceLimits) {
    let security_opt = Value::from("security_opt");
    if !service.contains_key(&security_opt) {
        service.insert(
            security_opt,
            Value::Sequence(vec![Value::from("no-new-privileges:true")]),
        );
    }

    let read_only = Value::from("read_only");
    if read_only_ok && !service.contains_key(&read_only) {
        service.insert(read_only, Value::from(true));
    }

    let cpus = Value::from("cpus");
    if !service.contains_key(&cpus) {
        service.insert(cpus, Value::from(resources.cpus.unwrap_or(DEFAULT_CPU_CAP)));
    }

    let mem_limit = Value::from("mem_limit");
    if !service.contains_key(&mem_limit) {
        let memory = resources.memory.as_deref().unwrap_or(DEFAULT_MEM_CAP);
        service.insert(mem_limit, Value::from(memory));
    }
}

/// `KEY=VALUE` lines, sorted by key.
fn render_env_file(env: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in env {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// First HTTP-looking host port: 80, 8080, 3000, else the first declared.
fn pick_proxy_port(ports: &[PortMapping]) -> Option<u16> {
    for preferred in PROXY_PORT_PREFERENCE {
        if ports.iter().any(|p| p.host == *preferred) {
            return Some(*preferred);
        }
    }
    ports.first().map(|p| p.host)
}

fn proxy_snippet(app_id: &str, port: u16) -> String {
    format!(
        "# managed by nosd\nhandle_path /apps/{app_id}/* {{\n    reverse_proxy 127.0.0.1:{port}\n}}\n"
    )
}

fn structured_param<T: serde::de::DeserializeOwned + Clone>(
    params: &BTreeMap<String, serde_json::Value>,
    key: &str,
    default: &[T],
) -> Result<Vec<T>, RenderError> {
    match params.get(key) {
        None => Ok(default.to_vec()),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|e| RenderError::BadStructuredParam {
                key: key.to_string(),
                message: e.to_string(),
            })
        }
    }
}

fn structured_param_single<T: serde::de::DeserializeOwned + Clone>(
    params: &BTreeMap<String, serde_json::Value>,
    key: &str,
    default: &T,
) -> Result<T, RenderError> {
    match params.get(key) {
        None => Ok(default.clone()),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|e| RenderError::BadStructuredParam {
                key: key.to_string(),
                message: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
