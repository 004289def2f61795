// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery-mode actions.
//!
//! Enabled by the `NOS_RECOVERY=1` boot flag and reachable only from
//! loopback. The daemon does not own accounts: each action writes a
//! durable request file the external auth subsystem consumes on its
//! next start, and OTP generation additionally returns the code.

use nos_engine::EngineError;
use rand::Rng;
use serde::Serialize;
use std::path::Path;

/// A persisted recovery request (`recovery/<action>.json`).
#[derive(Debug, Serialize)]
pub struct RecoveryRequest {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

fn write_request(dir: &Path, request: &RecoveryRequest) -> Result<(), EngineError> {
    let path = dir.join(format!("{}.json", request.action));
    nos_store::save_json(&path, request)?;
    Ok(())
}

pub fn reset_password(dir: &Path, user: &str) -> Result<(), EngineError> {
    write_request(
        dir,
        &RecoveryRequest {
            action: "reset-password".into(),
            user: Some(user.to_string()),
            otp: None,
            requested_at: chrono::Utc::now(),
        },
    )
}

pub fn disable_2fa(dir: &Path, user: &str) -> Result<(), EngineError> {
    write_request(
        dir,
        &RecoveryRequest {
            action: "disable-2fa".into(),
            user: Some(user.to_string()),
            otp: None,
            requested_at: chrono::Utc::now(),
        },
    )
}

/// One-time password length.
const OTP_LEN: usize = 8;

pub fn generate_otp(dir: &Path) -> Result<String, EngineError> {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::rng();
    let otp: String = (0..OTP_LEN)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect();

    write_request(
        dir,
        &RecoveryRequest {
            action: "generate-otp".into(),
            user: None,
            otp: Some(otp.clone()),
            requested_at: chrono::Utc::now(),
        },
    )?;
    Ok(otp)
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
