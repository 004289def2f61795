// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NithronOS privileged agent (nos-agent)
//!
//! Tiny root process listening on a local stream socket, executing a
//! closed allowlist of verbs on behalf of the daemon. Started by its
//! systemd unit; not meant to be invoked by hand.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use nos_agent::{AgentConfig, AgentServer};
use std::os::unix::fs::PermissionsExt;
use tokio::net::UnixListener;
use tracing::info;

// Exit codes shared with the daemon CLI surface.
const EXIT_GENERIC: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_PERMISSION: i32 = 3;

#[tokio::main]
async fn main() {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("nos-agent {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" | "help" => {
                println!("nos-agent {}", env!("CARGO_PKG_VERSION"));
                println!("NithronOS privileged agent - executes allowlisted verbs for nosd");
                println!();
                println!("USAGE:");
                println!("    nos-agent");
                println!();
                println!("The agent is started by its systemd unit and listens on a local");
                println!("stream socket. Configuration comes from NOS_AGENT_* environment");
                println!("variables.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return;
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: nos-agent [--help | --version]");
                std::process::exit(EXIT_USAGE);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AgentConfig::load();

    if let Some(parent) = config.socket_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("error: creating {}: {}", parent.display(), e);
            std::process::exit(EXIT_GENERIC);
        }
    }

    // Stale socket from a previous run
    let _ = std::fs::remove_file(&config.socket_path);

    let listener = match UnixListener::bind(&config.socket_path) {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("error: binding {}: {}", config.socket_path.display(), e);
            std::process::exit(EXIT_PERMISSION);
        }
        Err(e) => {
            eprintln!("error: binding {}: {}", config.socket_path.display(), e);
            std::process::exit(EXIT_GENERIC);
        }
    };

    // Only root and the service group may talk to the agent.
    if let Err(e) =
        std::fs::set_permissions(&config.socket_path, std::fs::Permissions::from_mode(0o660))
    {
        eprintln!(
            "error: setting permissions on {}: {}",
            config.socket_path.display(),
            e
        );
        std::process::exit(EXIT_PERMISSION);
    }

    info!("nos-agent {} starting", env!("CARGO_PKG_VERSION"));
    let server = AgentServer::new(config);
    server.run(listener).await;
}
