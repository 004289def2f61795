// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    stopped_to_starting = { AppStatus::Stopped, AppStatus::Starting, true },
    starting_to_running = { AppStatus::Starting, AppStatus::Running, true },
    running_to_stopping = { AppStatus::Running, AppStatus::Stopping, true },
    stopping_to_stopped = { AppStatus::Stopping, AppStatus::Stopped, true },
    running_to_upgrading = { AppStatus::Running, AppStatus::Upgrading, true },
    upgrading_to_running = { AppStatus::Upgrading, AppStatus::Running, true },
    upgrading_to_rolling_back = { AppStatus::Upgrading, AppStatus::RollingBack, true },
    rolling_back_to_running = { AppStatus::RollingBack, AppStatus::Running, true },
    running_to_rolling_back = { AppStatus::Running, AppStatus::RollingBack, true },
    error_to_starting = { AppStatus::Error, AppStatus::Starting, true },
    error_to_rolling_back = { AppStatus::Error, AppStatus::RollingBack, true },
    stopped_to_running = { AppStatus::Stopped, AppStatus::Running, false },
    running_to_starting = { AppStatus::Running, AppStatus::Starting, false },
    stopped_to_upgrading = { AppStatus::Stopped, AppStatus::Upgrading, false },
    rolling_back_to_stopped = { AppStatus::RollingBack, AppStatus::Stopped, false },
)]
fn transition_table(from: AppStatus, to: AppStatus, ok: bool) {
    assert_eq!(from.can_transition(to), ok, "{from} → {to}");
}

#[parameterized(
    from_stopped = { AppStatus::Stopped },
    from_running = { AppStatus::Running },
    from_upgrading = { AppStatus::Upgrading },
    from_unknown = { AppStatus::Unknown },
)]
fn any_state_can_fail(from: AppStatus) {
    assert!(from.can_transition(AppStatus::Error));
}

#[test]
fn busy_states() {
    assert!(AppStatus::Upgrading.is_busy());
    assert!(AppStatus::RollingBack.is_busy());
    assert!(!AppStatus::Running.is_busy());
    assert!(!AppStatus::Error.is_busy());
}

#[test]
fn status_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&AppStatus::RollingBack).unwrap(),
        "\"rolling_back\""
    );
}

#[test]
fn registry_defaults_empty() {
    let reg: AppRegistry = serde_json::from_str("{}").unwrap();
    assert!(reg.apps.is_empty());
}
