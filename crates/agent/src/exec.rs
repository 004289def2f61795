// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers for verb handlers.

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for quick commands (status queries, nft loads).
pub const QUICK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for compose operations (pull can fetch images).
pub const COMPOSE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default timeout for package manager operations.
pub const PKG_TIMEOUT: Duration = Duration::from_secs(600);

/// Captured output of a completed subprocess.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn from_output(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        }
    }
}

/// Run a subprocess with a timeout.
///
/// The child is killed automatically if the timeout elapses (via the
/// tokio `Child` drop implementation). Timeout expiration converts into
/// a descriptive error string.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<ExecResult, String> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(ExecResult::from_output(output)),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
