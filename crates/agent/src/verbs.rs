// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verb allowlist and dispatch.
//!
//! No shell passthrough: every verb maps to a fixed argv with validated
//! arguments. Verbs not in the allowlist are rejected with
//! `err.code = "verb.denied"` before any side effect.

use crate::exec::{run_with_timeout, ExecResult, COMPOSE_TIMEOUT, PKG_TIMEOUT, QUICK_TIMEOUT};
use crate::server::AgentConfig;
use crate::wire::VerbErrorBody;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;

/// The closed allowlist. Anything else is denied.
pub const ALLOWED_VERBS: &[&str] = &[
    "container.compose.up",
    "container.compose.down",
    "container.compose.pull",
    "container.status",
    "service.start",
    "service.stop",
    "service.restart",
    "service.enable",
    "service.disable",
    "service.reload",
    "service.is_active",
    "fs.subvolume.create",
    "fs.subvolume.snapshot",
    "fs.subvolume.delete",
    "fs.is_cow",
    "firewall.load_ruleset",
    "firewall.save_ruleset",
    "pkg.refresh",
    "pkg.stage",
    "pkg.upgrade",
    "pkg.verify_keys",
    "pkg.prune_cache",
    "proxy.reload",
    "tls.reload",
    "vpn.up",
    "vpn.down",
];

pub fn is_allowed_verb(verb: &str) -> bool {
    ALLOWED_VERBS.contains(&verb)
}

/// Outcome of a dispatched verb, before the response id is attached.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub result: Option<serde_json::Value>,
    pub error: Option<VerbErrorBody>,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
}

impl DispatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn denied(verb: &str) -> Self {
        Self {
            error: Some(VerbErrorBody {
                code: "verb.denied".into(),
                message: format!("verb not in allowlist: {verb}"),
                details: None,
            }),
            ..Default::default()
        }
    }

    fn bad_args(message: impl Into<String>) -> Self {
        Self {
            error: Some(VerbErrorBody {
                code: "verb.bad_args".into(),
                message: message.into(),
                details: None,
            }),
            ..Default::default()
        }
    }

    fn exec_error(message: String) -> Self {
        Self {
            error: Some(VerbErrorBody {
                code: "verb.exec".into(),
                message,
                details: None,
            }),
            ..Default::default()
        }
    }

    fn from_exec(exec: ExecResult) -> Self {
        let error = if exec.success() {
            None
        } else {
            Some(VerbErrorBody {
                code: "verb.failed".into(),
                message: format!("command exited with {:?}", exec.exit_code),
                details: None,
            })
        };
        Self {
            result: None,
            error,
            stdout: Some(exec.stdout),
            stderr: Some(exec.stderr),
            exit_code: exec.exit_code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ComposeArgs {
    compose_file: PathBuf,
    project: String,
}

#[derive(Debug, Deserialize)]
struct ProjectArgs {
    project: String,
}

#[derive(Debug, Deserialize)]
struct ServiceArgs {
    unit: String,
}

#[derive(Debug, Deserialize)]
struct PathArgs {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SnapshotArgs {
    source: PathBuf,
    dest: PathBuf,
    #[serde(default)]
    readonly: bool,
}

/// Compose project names are daemon-generated slugs.
fn valid_project(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Systemd unit names: conservative charset, no path separators.
fn valid_unit(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
}

fn parse<T: serde::de::DeserializeOwned>(args: &serde_json::Value) -> Result<T, DispatchOutcome> {
    serde_json::from_value(args.clone()).map_err(|e| DispatchOutcome::bad_args(e.to_string()))
}

/// Execute one verb. The allowlist check happens here, before anything
/// touches the system.
pub async fn dispatch(verb: &str, args: &serde_json::Value, config: &AgentConfig) -> DispatchOutcome {
    if !is_allowed_verb(verb) {
        return DispatchOutcome::denied(verb);
    }

    match verb {
        "container.compose.up" => compose(args, &["up", "-d", "--remove-orphans"]).await,
        "container.compose.down" => compose(args, &["down"]).await,
        "container.compose.pull" => compose(args, &["pull"]).await,
        "container.status" => container_status(args).await,

        "service.start" => service(args, "start").await,
        "service.stop" => service(args, "stop").await,
        "service.restart" => service(args, "restart").await,
        "service.enable" => service(args, "enable").await,
        "service.disable" => service(args, "disable").await,
        "service.reload" => service(args, "reload").await,
        "service.is_active" => service(args, "is-active").await,

        "fs.subvolume.create" => subvolume_create(args).await,
        "fs.subvolume.snapshot" => subvolume_snapshot(args).await,
        "fs.subvolume.delete" => subvolume_delete(args).await,
        "fs.is_cow" => fs_is_cow(args).await,

        "firewall.load_ruleset" => firewall_load(args).await,
        "firewall.save_ruleset" => firewall_save(args).await,

        "pkg.refresh" => pkg(&["update", "-q"]).await,
        "pkg.stage" => pkg(&["upgrade", "-y", "-d", "-q"]).await,
        "pkg.upgrade" => pkg(&["upgrade", "-y", "-q"]).await,
        "pkg.verify_keys" => pkg(&["check", "-q"]).await,
        "pkg.prune_cache" => pkg(&["clean", "-q"]).await,

        "proxy.reload" => reload_unit(&config.proxy_unit).await,
        "tls.reload" => reload_unit(&config.tls_unit).await,

        "vpn.up" => wg_quick("up", &config.vpn_interface).await,
        "vpn.down" => wg_quick("down", &config.vpn_interface).await,

        // Unreachable: the allowlist gate above already rejected it.
        other => DispatchOutcome::denied(other),
    }
}

async fn compose(args: &serde_json::Value, action: &[&str]) -> DispatchOutcome {
    let parsed: ComposeArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    if !valid_project(&parsed.project) {
        return DispatchOutcome::bad_args(format!("invalid project name: {}", parsed.project));
    }

    let mut cmd = Command::new("docker");
    cmd.arg("compose")
        .arg("-f")
        .arg(&parsed.compose_file)
        .arg("-p")
        .arg(&parsed.project)
        .args(action);
    match run_with_timeout(cmd, COMPOSE_TIMEOUT, "docker compose").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn container_status(args: &serde_json::Value) -> DispatchOutcome {
    let parsed: ProjectArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    if !valid_project(&parsed.project) {
        return DispatchOutcome::bad_args(format!("invalid project name: {}", parsed.project));
    }

    let mut cmd = Command::new("docker");
    cmd.args(["compose", "-p", &parsed.project, "ps", "-a", "--format", "json"]);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "docker compose ps").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn service(args: &serde_json::Value, op: &str) -> DispatchOutcome {
    let parsed: ServiceArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    if !valid_unit(&parsed.unit) {
        return DispatchOutcome::bad_args(format!("invalid unit name: {}", parsed.unit));
    }

    let mut cmd = Command::new("systemctl");
    cmd.arg(op).arg(&parsed.unit);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "systemctl").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn reload_unit(unit: &str) -> DispatchOutcome {
    let mut cmd = Command::new("systemctl");
    cmd.args(["reload", unit]);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "systemctl reload").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn subvolume_create(args: &serde_json::Value) -> DispatchOutcome {
    let parsed: PathArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let mut cmd = Command::new("btrfs");
    cmd.args(["subvolume", "create"]).arg(&parsed.path);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "btrfs subvolume create").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn subvolume_snapshot(args: &serde_json::Value) -> DispatchOutcome {
    let parsed: SnapshotArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let mut cmd = Command::new("btrfs");
    cmd.args(["subvolume", "snapshot"]);
    if parsed.readonly {
        cmd.arg("-r");
    }
    cmd.arg(&parsed.source).arg(&parsed.dest);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "btrfs subvolume snapshot").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn subvolume_delete(args: &serde_json::Value) -> DispatchOutcome {
    let parsed: PathArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let mut cmd = Command::new("btrfs");
    cmd.args(["subvolume", "delete"]).arg(&parsed.path);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "btrfs subvolume delete").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn fs_is_cow(args: &serde_json::Value) -> DispatchOutcome {
    let parsed: PathArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let mut cmd = Command::new("stat");
    cmd.args(["-f", "--format=%T"]).arg(&parsed.path);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "stat -f").await {
        Ok(exec) if exec.success() => {
            let fstype = exec.stdout.trim().to_string();
            let cow = fstype == "btrfs";
            DispatchOutcome {
                result: Some(serde_json::json!({ "cow": cow, "fstype": fstype })),
                stdout: Some(exec.stdout),
                stderr: Some(exec.stderr),
                exit_code: exec.exit_code,
                error: None,
            }
        }
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn firewall_load(args: &serde_json::Value) -> DispatchOutcome {
    let parsed: PathArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let mut cmd = Command::new("nft");
    cmd.arg("-f").arg(&parsed.path);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "nft -f").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

/// Capture the live ruleset to a file. The redirect happens in-process;
/// there is no shell.
async fn firewall_save(args: &serde_json::Value) -> DispatchOutcome {
    let parsed: PathArgs = match parse(args) {
        Ok(p) => p,
        Err(e) => return e,
    };
    let mut cmd = Command::new("nft");
    cmd.args(["list", "ruleset"]);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "nft list ruleset").await {
        Ok(exec) if exec.success() => {
            if let Err(e) = tokio::fs::write(&parsed.path, exec.stdout.as_bytes()).await {
                return DispatchOutcome::exec_error(format!(
                    "writing ruleset to {}: {}",
                    parsed.path.display(),
                    e
                ));
            }
            DispatchOutcome {
                stdout: None,
                stderr: Some(exec.stderr),
                exit_code: exec.exit_code,
                result: None,
                error: None,
            }
        }
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn pkg(apt_args: &[&str]) -> DispatchOutcome {
    let mut cmd = Command::new("apt-get");
    cmd.args(apt_args);
    cmd.env("DEBIAN_FRONTEND", "noninteractive");
    match run_with_timeout(cmd, PKG_TIMEOUT, "apt-get").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

async fn wg_quick(op: &str, interface: &str) -> DispatchOutcome {
    let mut cmd = Command::new("wg-quick");
    cmd.arg(op).arg(interface);
    match run_with_timeout(cmd, QUICK_TIMEOUT, "wg-quick").await {
        Ok(exec) => DispatchOutcome::from_exec(exec),
        Err(message) => DispatchOutcome::exec_error(message),
    }
}

#[cfg(test)]
#[path = "verbs_tests.rs"]
mod tests;
