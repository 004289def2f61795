// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    success = { UpdateState::Success, true },
    failed = { UpdateState::Failed, true },
    rolled_back = { UpdateState::RolledBack, true },
    idle = { UpdateState::Idle, false },
    applying = { UpdateState::Applying, false },
    rolling_back = { UpdateState::RollingBack, false },
)]
fn terminal_states(state: UpdateState, terminal: bool) {
    assert_eq!(state.is_terminal(), terminal);
}

#[parameterized(
    idle_to_checking = { UpdateState::Idle, UpdateState::Checking, true },
    checking_to_downloading = { UpdateState::Checking, UpdateState::Downloading, true },
    downloading_to_applying = { UpdateState::Downloading, UpdateState::Applying, true },
    applying_to_verifying = { UpdateState::Applying, UpdateState::Verifying, true },
    verifying_to_success = { UpdateState::Verifying, UpdateState::Success, true },
    verifying_to_rolling_back = { UpdateState::Verifying, UpdateState::RollingBack, true },
    rolling_back_to_rolled_back = { UpdateState::RollingBack, UpdateState::RolledBack, true },
    failed_to_rolling_back = { UpdateState::Failed, UpdateState::RollingBack, true },
    idle_to_applying = { UpdateState::Idle, UpdateState::Applying, false },
    success_to_rolling_back = { UpdateState::Success, UpdateState::RollingBack, true },
    rolled_back_to_rolling_back = { UpdateState::RolledBack, UpdateState::RollingBack, false },
    applying_to_success = { UpdateState::Applying, UpdateState::Success, false },
)]
fn transition_table(from: UpdateState, to: UpdateState, ok: bool) {
    assert_eq!(from.can_transition(to), ok, "{from} → {to}");
}

#[test]
fn default_doc_is_idle_v1() {
    let doc = UpdateStateDoc::default();
    assert_eq!(doc.version, UPDATE_DOC_VERSION);
    assert_eq!(doc.state, UpdateState::Idle);
    assert!(doc.reason.is_none());
}

#[test]
fn doc_round_trips() {
    let mut doc = UpdateStateDoc::default();
    doc.state = UpdateState::Applying;
    doc.progress = UpdateProgress {
        state: UpdateState::Applying,
        percent: 60,
        message: "upgrading packages".into(),
    };
    let json = serde_json::to_string(&doc).unwrap();
    let back: UpdateStateDoc = serde_json::from_str(&json).unwrap();
    assert_eq!(back, doc);
}
