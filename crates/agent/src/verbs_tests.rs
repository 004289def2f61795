// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    compose_up = { "container.compose.up" },
    status = { "container.status" },
    service_restart = { "service.restart" },
    is_cow = { "fs.is_cow" },
    load_ruleset = { "firewall.load_ruleset" },
    pkg_upgrade = { "pkg.upgrade" },
    vpn_up = { "vpn.up" },
)]
fn allowlisted_verbs(verb: &str) {
    assert!(is_allowed_verb(verb));
}

#[parameterized(
    shell = { "shell.exec" },
    empty = { "" },
    near_miss = { "container.compose.exec" },
    rm = { "fs.rm" },
)]
fn denied_verbs(verb: &str) {
    assert!(!is_allowed_verb(verb));
}

#[tokio::test]
async fn unknown_verb_is_denied_with_code() {
    let outcome = dispatch("shell.exec", &serde_json::json!({}), &AgentConfig::default()).await;
    assert!(!outcome.is_ok());
    assert_eq!(outcome.error.unwrap().code, "verb.denied");
}

#[tokio::test]
async fn bad_args_are_rejected_before_execution() {
    let outcome = dispatch(
        "container.compose.up",
        &serde_json::json!({"project": "x"}), // missing compose_file
        &AgentConfig::default(),
    )
    .await;
    assert_eq!(outcome.error.unwrap().code, "verb.bad_args");
}

#[tokio::test]
async fn invalid_project_name_is_rejected() {
    let outcome = dispatch(
        "container.status",
        &serde_json::json!({"project": "bad name; rm -rf"}),
        &AgentConfig::default(),
    )
    .await;
    assert_eq!(outcome.error.unwrap().code, "verb.bad_args");
}

#[tokio::test]
async fn invalid_unit_name_is_rejected() {
    let outcome = dispatch(
        "service.start",
        &serde_json::json!({"unit": "../etc/passwd"}),
        &AgentConfig::default(),
    )
    .await;
    assert_eq!(outcome.error.unwrap().code, "verb.bad_args");
}

#[test]
fn project_name_validation() {
    assert!(valid_project("nos-app-whoami"));
    assert!(valid_project("app_1"));
    assert!(!valid_project(""));
    assert!(!valid_project("a b"));
    assert!(!valid_project("a/b"));
}

#[test]
fn unit_name_validation() {
    assert!(valid_unit("docker.service"));
    assert!(valid_unit("wg-quick@nos0"));
    assert!(!valid_unit("a b"));
    assert!(!valid_unit("a/b"));
}
