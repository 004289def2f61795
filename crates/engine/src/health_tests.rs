// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nos_agent::client::fake::{FakeAgent, FakeReply};
use nos_core::SystemClock;
use yare::parameterized;

fn running(health: &str) -> String {
    serde_json::json!({"State": "running", "Health": health}).to_string()
}

#[test]
fn parse_json_lines() {
    let stdout = format!("{}\n{}\n", running("healthy"), running(""));
    let states = parse_compose_ps(&stdout);
    assert_eq!(states.len(), 2);
    assert!(states.iter().all(ContainerState::is_healthy));
}

#[test]
fn parse_json_array() {
    let stdout = format!("[{}, {}]", running("healthy"), running("starting"));
    let states = parse_compose_ps(&stdout);
    assert_eq!(states.len(), 2);
    assert!(!states[1].is_healthy());
}

#[test]
fn parse_empty_output() {
    assert!(parse_compose_ps("").is_empty());
    assert!(parse_compose_ps("  \n").is_empty());
}

#[parameterized(
    running_no_healthcheck = { "running", "", true },
    running_healthy = { "running", "healthy", true },
    running_unhealthy = { "running", "unhealthy", false },
    running_starting = { "running", "starting", false },
    exited = { "exited", "", false },
    restarting = { "restarting", "healthy", false },
)]
fn healthy_matrix(state: &str, health: &str, expected: bool) {
    let container = ContainerState {
        state: state.into(),
        health: health.into(),
    };
    assert_eq!(container.is_healthy(), expected);
}

fn spec(timeout_secs: u64, healthy_after: u32) -> HealthSpec {
    HealthSpec {
        kind: HealthKind::Container,
        path: None,
        interval_secs: 1,
        healthy_after,
        timeout_secs,
    }
}

fn waiter(agent: &std::sync::Arc<FakeAgent>) -> HealthWaiter {
    HealthWaiter::new(
        std::sync::Arc::clone(agent) as Arc<dyn AgentClient>,
        Arc::new(SystemClock),
    )
}

#[tokio::test]
async fn wait_succeeds_after_consecutive_healthy_ticks() {
    let agent = std::sync::Arc::new(FakeAgent::new());
    agent.default_reply(
        "container.status",
        FakeReply::ok_with_stdout(running("healthy")),
    );

    let waiter = waiter(&agent);
    waiter
        .wait_healthy("nos-app-whoami", &spec(30, 2), None, &CancelToken::new())
        .await
        .unwrap();
    assert!(agent.call_count("container.status") >= 2);
}

#[tokio::test]
async fn unhealthy_tick_resets_the_streak() {
    let agent = std::sync::Arc::new(FakeAgent::new());
    agent.script(
        "container.status",
        FakeReply::ok_with_stdout(running("healthy")),
    );
    agent.script(
        "container.status",
        FakeReply::ok_with_stdout(running("unhealthy")),
    );
    agent.default_reply(
        "container.status",
        FakeReply::ok_with_stdout(running("healthy")),
    );

    let waiter = waiter(&agent);
    waiter
        .wait_healthy("nos-app-whoami", &spec(30, 2), None, &CancelToken::new())
        .await
        .unwrap();
    // healthy, unhealthy (reset), healthy, healthy → at least 4 polls
    assert!(agent.call_count("container.status") >= 4);
}

#[tokio::test]
async fn timeout_is_a_timeout_error() {
    let agent = std::sync::Arc::new(FakeAgent::new());
    agent.default_reply(
        "container.status",
        FakeReply::ok_with_stdout(running("unhealthy")),
    );

    let waiter = waiter(&agent);
    let err = waiter
        .wait_healthy("nos-app-whoami", &spec(1, 2), None, &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), nos_core::ErrorKind::Timeout);
}

#[tokio::test]
async fn cancellation_short_circuits() {
    let agent = std::sync::Arc::new(FakeAgent::new());
    agent.default_reply(
        "container.status",
        FakeReply::ok_with_stdout(running("starting")),
    );

    let cancel = CancelToken::new();
    cancel.cancel();

    let waiter = waiter(&agent);
    let err = waiter
        .wait_healthy("nos-app-whoami", &spec(60, 2), None, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), nos_core::ErrorKind::Timeout);
    assert!(err.body.code.contains("cancelled"));
    // Cancelled before the first poll
    assert_eq!(agent.call_count("container.status"), 0);
}

#[tokio::test]
async fn status_poll_failure_counts_as_unhealthy() {
    let agent = std::sync::Arc::new(FakeAgent::new());
    agent.script("container.status", FakeReply::failed("daemon not running"));
    agent.default_reply(
        "container.status",
        FakeReply::ok_with_stdout(running("healthy")),
    );

    let waiter = waiter(&agent);
    waiter
        .wait_healthy("nos-app-whoami", &spec(30, 1), None, &CancelToken::new())
        .await
        .unwrap();
}
