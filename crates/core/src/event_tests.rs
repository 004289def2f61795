// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

#[test]
fn event_serializes_with_dotted_type_tag() {
    let event = Event::CatalogSourceRejected {
        source: "community".into(),
        reason: "digest mismatch".into(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "catalog.source.rejected");
    assert_eq!(json["source"], "community");
}

#[test]
fn type_tag_matches_serde_rename() {
    let events = [
        Event::AppInstallStarted { id: "whoami".into() },
        Event::FirewallRollbackAuto {
            plan_id: PlanId::new("p1"),
            restored_mode: FirewallMode::LanOnly,
        },
        Event::AgentVerbDenied {
            verb: "shell.exec".into(),
        },
    ];
    for event in events {
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.type_tag());
    }
}

#[test]
fn failure_events_are_error_severity() {
    let event = Event::AppUpgradeFailed {
        id: "whoami".into(),
        error: "unhealthy".into(),
    };
    assert_eq!(event.severity(), Severity::Error);
}

#[test]
fn auto_rollback_is_warning_severity() {
    let event = Event::FirewallRollbackAuto {
        plan_id: PlanId::new("p1"),
        restored_mode: FirewallMode::LanOnly,
    };
    assert_eq!(event.severity(), Severity::Warning);
}

#[test]
fn record_envelope_shape() {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let record = EventRecord::new(
        "ev-1".into(),
        "system",
        at,
        Event::AppStarted { id: "whoami".into() },
    );
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["type"], "app.started");
    assert_eq!(json["id"], "ev-1");
    assert_eq!(json["target"], "whoami");
    assert_eq!(json["severity"], "info");
    assert_eq!(json["payload"]["id"], "whoami");
}

#[test]
fn record_round_trips() {
    let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let record = EventRecord::new(
        "ev-2".into(),
        "api",
        at,
        Event::UpdateStateChanged {
            state: UpdateState::Applying,
            percent: 60,
            message: "installing".into(),
        },
    );
    let line = serde_json::to_string(&record).unwrap();
    let back: EventRecord = serde_json::from_str(&line).unwrap();
    assert_eq!(back, record);
}
