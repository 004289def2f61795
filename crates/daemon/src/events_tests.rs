// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nos_engine::EventSink;

fn bus(dir: &tempfile::TempDir) -> EventBus {
    EventBus::new(dir.path().join("events.jsonl"))
}

#[test]
fn publish_appends_to_the_journal() {
    let dir = tempfile::tempdir().unwrap();
    let bus = bus(&dir);

    bus.publish_as("api", Event::AppStarted { id: "whoami".into() });
    bus.publish(Event::AppStopped { id: "whoami".into() });

    let text = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: EventRecord = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first.actor, "api");
    assert_eq!(first.type_tag, "app.started");

    let second: EventRecord = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second.actor, "system");
}

#[tokio::test]
async fn subscribers_receive_published_events() {
    let dir = tempfile::tempdir().unwrap();
    let bus = bus(&dir);
    let mut rx = bus.subscribe();

    bus.publish(Event::AppStarted { id: "whoami".into() });
    let record = rx.recv().await.unwrap();
    assert_eq!(record.type_tag, "app.started");
}

#[test]
fn publish_without_subscribers_does_not_fail() {
    let dir = tempfile::tempdir().unwrap();
    let bus = bus(&dir);
    bus.publish(Event::RecoveryOtpGenerated);
}

#[test]
fn recent_returns_tail_after_id() {
    let dir = tempfile::tempdir().unwrap();
    let bus = bus(&dir);

    let a = bus.publish_as("t", Event::AppStarted { id: "a".into() });
    let _b = bus.publish_as("t", Event::AppStarted { id: "b".into() });
    let c = bus.publish_as("t", Event::AppStarted { id: "c".into() });

    let all = bus.recent(None, 100);
    assert_eq!(all.len(), 3);

    let after_a = bus.recent(Some(&a.id), 100);
    assert_eq!(after_a.len(), 2);
    assert_eq!(after_a[1].id, c.id);

    let limited = bus.recent(None, 1);
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, c.id);
}

#[test]
fn recent_with_missing_journal_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let bus = bus(&dir);
    assert!(bus.recent(None, 10).is_empty());
}
