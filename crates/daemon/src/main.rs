// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! NithronOS control-plane daemon (nosd)
//!
//! Owns all persistent control-plane state, exposes the HTTP API on
//! loopback, and drives the privileged agent.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use nos_daemon::lifecycle::{self, LifecycleError};
use nos_daemon::{http, Config};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const EXIT_GENERIC: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_PERMISSION: i32 = 3;
const EXIT_LOCK_HELD: i32 = 4;

#[tokio::main]
async fn main() {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("nosd {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            "--help" | "-h" | "help" => {
                println!("nosd {}", env!("CARGO_PKG_VERSION"));
                println!("NithronOS control-plane daemon");
                println!();
                println!("USAGE:");
                println!("    nosd");
                println!();
                println!("The daemon is started by its systemd unit. It reads");
                println!("/etc/nos/nosd.toml (override with NOS_CONFIG) and serves the");
                println!("control API on loopback. Set NOS_RECOVERY=1 to enable the");
                println!("recovery endpoints for one boot.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return;
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: nosd [--help | --version]");
                std::process::exit(EXIT_USAGE);
            }
        }
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(EXIT_USAGE);
        }
    };

    rotate_log_if_needed(&config.log_path);
    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: setting up logging: {e}");
            std::process::exit(EXIT_GENERIC);
        }
    };

    info!("nosd {} starting", env!("CARGO_PKG_VERSION"));

    let core = match lifecycle::startup(config.clone()).await {
        Ok(core) => core,
        Err(LifecycleError::LockFailed(e)) => {
            eprintln!("nosd is already running ({e})");
            std::process::exit(EXIT_LOCK_HELD);
        }
        Err(e) => {
            error!("failed to start daemon: {}", e);
            eprintln!("error: {e}");
            std::process::exit(EXIT_GENERIC);
        }
    };

    let listener = match tokio::net::TcpListener::bind(&config.http_listen).await {
        Ok(listener) => listener,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            eprintln!("error: binding {}: {}", config.http_listen, e);
            std::process::exit(EXIT_PERMISSION);
        }
        Err(e) => {
            eprintln!("error: binding {}: {}", config.http_listen, e);
            std::process::exit(EXIT_GENERIC);
        }
    };

    let shutdown = Arc::new(tokio::sync::Notify::new());

    // Background scheduler: catalog refresh + retention pruning.
    tokio::spawn(lifecycle::run_scheduler(
        Arc::clone(&core),
        Arc::clone(&shutdown),
    ));

    let app = http::router(Arc::clone(&core))
        .into_make_service_with_connect_info::<SocketAddr>();

    info!("daemon ready, listening on {}", config.http_listen);
    if config.recovery_mode {
        info!("recovery mode enabled for this boot");
    }

    // Signal ready for the parent (systemd / installer waiting on startup)
    println!("READY");

    let serve_shutdown = Arc::clone(&shutdown);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        serve_shutdown.notified().await;
    });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("server error: {}", e);
            }
        }
        _ = wait_for_signal() => {
            info!("shutdown signal received");
            shutdown.notify_waiters();
        }
    }

    info!("daemon stopped");
}

async fn wait_for_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!("installing SIGTERM handler: {}", e);
            return std::future::pending().await;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(sigint) => sigint,
        Err(e) => {
            error!("installing SIGINT handler: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep (nosd.log.1, .2, .3).
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
///
/// Shifts `nosd.log` → `nosd.log.1` → `nosd.log.2` → `nosd.log.3`,
/// deleting the oldest. Best-effort: rotation failures are silently
/// ignored so the daemon still starts.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let parent = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::other("log path has no parent directory"))?;
    std::fs::create_dir_all(parent)?;
    let file_name = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::other("log path has no file name"))?;

    let file_appender = tracing_appender::rolling::never(parent, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
