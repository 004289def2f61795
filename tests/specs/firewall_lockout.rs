// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Firewall lock-out auto-recovery: an unconfirmed apply rolls back
//! when the confirm timer fires.

use super::prelude::*;
use nos_core::{ErrorKind, FirewallMode, FirewallStatus, Identity, Role};
use std::time::Duration;

fn admin() -> Identity {
    Identity {
        user_id: "alex".into(),
        roles: vec![Role::Admin],
        source_ip: Some("192.168.1.10".into()),
        mfa_verified: true,
    }
}

#[tokio::test]
async fn unconfirmed_apply_rolls_back_automatically() {
    let s = specs().await;

    // Client is on the LAN; direct exposure would lock it out if wrong.
    let plan = s.core.firewall.plan(FirewallMode::Direct);
    assert_eq!(plan.current, FirewallMode::LanOnly);

    let pending = s
        .core
        .firewall
        .apply(&plan.plan_id, Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(pending.previous_mode, FirewallMode::LanOnly);
    assert_eq!(
        s.core.firewall.state().status,
        FirewallStatus::PendingConfirm
    );

    // The client never confirms; the timer restores the previous mode.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let state = s.core.firewall.state();
    assert_eq!(state.status, FirewallStatus::Active);
    assert_eq!(state.mode, FirewallMode::LanOnly);
    assert!(state.pending.is_none());

    // Backup file deleted after the restore
    assert!(!s.dir.path().join("firewall/ruleset.nft.backup").exists());

    // firewall.rollback.auto emitted
    assert!(event_types(&s.core)
        .iter()
        .any(|t| t == "firewall.rollback.auto"));

    // Confirm after the fact is a precondition error
    let err = s
        .core
        .firewall
        .confirm(&plan.plan_id, &admin())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[tokio::test]
async fn confirmed_apply_stays_active() {
    let s = specs().await;

    let plan = s.core.firewall.plan(FirewallMode::VpnOnly);
    s.core
        .firewall
        .apply(&plan.plan_id, Duration::from_secs(60))
        .await
        .unwrap();
    let state = s.core.firewall.confirm(&plan.plan_id, &admin()).await.unwrap();

    assert_eq!(state.mode, FirewallMode::VpnOnly);
    assert_eq!(state.status, FirewallStatus::Active);

    // VPN interface came up in the same apply
    assert_eq!(s.agent.call_count("vpn.up"), 1);
}

#[tokio::test]
async fn plan_apply_confirm_for_current_mode_is_a_no_op() {
    let s = specs().await;
    let before = s.core.firewall.state();

    let plan = s.core.firewall.plan(before.mode);
    assert!(plan.diff.is_empty());

    s.core
        .firewall
        .apply(&plan.plan_id, Duration::from_secs(60))
        .await
        .unwrap();
    let after = s.core.firewall.confirm(&plan.plan_id, &admin()).await.unwrap();

    assert_eq!(after.mode, before.mode);
    assert_eq!(after.status, FirewallStatus::Active);
}
