// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn reset_password_writes_request_file() {
    let dir = tempfile::tempdir().unwrap();
    reset_password(dir.path(), "alex").unwrap();

    let text = std::fs::read_to_string(dir.path().join("reset-password.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["action"], "reset-password");
    assert_eq!(json["user"], "alex");
}

#[test]
fn generate_otp_returns_and_persists_the_code() {
    let dir = tempfile::tempdir().unwrap();
    let otp = generate_otp(dir.path()).unwrap();
    assert_eq!(otp.len(), 8);

    let text = std::fs::read_to_string(dir.path().join("generate-otp.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["otp"], otp.as_str());
}

#[test]
fn otps_are_not_constant() {
    let dir = tempfile::tempdir().unwrap();
    let a = generate_otp(dir.path()).unwrap();
    let b = generate_otp(dir.path()).unwrap();
    // Two 8-char draws from a 32-char set colliding is ~1e-12.
    assert_ne!(a, b);
}

#[test]
fn disable_2fa_writes_request_file() {
    let dir = tempfile::tempdir().unwrap();
    disable_2fa(dir.path(), "alex").unwrap();
    assert!(dir.path().join("disable-2fa.json").exists());
}
