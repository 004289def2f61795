// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An agent denial surfaces as External/verb.denied and leaves no
//! installed-app state behind.

use super::prelude::*;
use nos_agent::client::fake::FakeReply;
use nos_core::{CancelToken, ErrorKind, Event, TxResult};
use nos_engine::EventSink;

#[tokio::test]
async fn denied_verb_is_external_and_leaves_no_app_state() {
    let s = specs().await;

    // Test seam: the agent denies the compose verb as if it were
    // missing from the allowlist.
    s.agent
        .script("container.compose.up", FakeReply::denied());

    let err = s
        .core
        .apps
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::External);
    assert_eq!(err.body.code, "external.verb.denied");

    // No installed app, and the transaction records the failure
    assert!(s.core.apps.get("whoami").unwrap().is_none());
    let txs = s.core.index.list().unwrap();
    assert_eq!(txs.last().unwrap().result, TxResult::Failed);
}

#[tokio::test]
async fn denial_event_reaches_the_journal() {
    let s = specs().await;
    // The server-side dispatcher emits this when it denies a verb; the
    // daemon mirrors it into the journal when the client reports denial.
    s.core.bus.publish(Event::AgentVerbDenied {
        verb: "shell.exec".into(),
    });
    assert!(event_types(&s.core).iter().any(|t| t == "agent.verb.denied"));
}

#[tokio::test]
async fn wire_level_denial_round_trip() {
    // The verb dispatcher itself: an unlisted verb is denied with the
    // stable code before any side effect.
    use nos_agent::server::AgentConfig;
    use nos_agent::verbs;

    let outcome = verbs::dispatch(
        "fs.rm",
        &serde_json::json!({"path": "/"}),
        &AgentConfig::default(),
    )
    .await;
    assert!(!outcome.is_ok());
    assert_eq!(outcome.error.unwrap().code, "verb.denied");
}
