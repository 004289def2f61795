// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Install reaches running; a bad upgrade parameter is rejected before
//! any snapshot or mutation.

use super::prelude::*;
use nos_core::{AppStatus, CancelToken, ErrorKind};

#[tokio::test]
async fn install_then_bad_upgrade_param_leaves_app_untouched() {
    let s = specs().await;

    // Install("whoami", {PORT: "8080"}) → running
    let app = s
        .core
        .apps
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(app.status, AppStatus::Running);
    assert_eq!(app.snapshots.len(), 1);
    assert_eq!(app.snapshots[0].tag, "post-install");

    // Upgrade("whoami", "vBAD", {PORT: "-1"}) → Validation error
    let err = s
        .core
        .apps
        .upgrade("whoami", "vBAD", Some(port_params("-1")), &CancelToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    // InstalledApp unchanged; validation preceded the pre-upgrade
    // snapshot, so only the post-install one exists.
    let after = s.core.apps.get("whoami").unwrap().unwrap();
    similar_asserts::assert_eq!(after, app);
    assert_eq!(after.snapshots.len(), 1);
    assert_eq!(after.snapshots[0].tag, "post-install");
}

#[tokio::test]
async fn repeated_upgrade_with_same_version_is_a_no_op() {
    let s = specs().await;
    s.core
        .apps
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();

    let first = s
        .core
        .apps
        .upgrade("whoami", "1.1.0", None, &CancelToken::new())
        .await
        .unwrap();
    let calls_after_first = s.agent.calls().len();

    // Second call with the same version+params digest: detected and
    // skipped without touching the agent.
    let second = s
        .core
        .apps
        .upgrade("whoami", "1.1.0", None, &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(s.agent.calls().len(), calls_after_first);
}

#[tokio::test]
async fn install_then_delete_returns_the_tree_to_empty() {
    let s = specs().await;
    s.core
        .apps
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();
    assert!(s.dir.path().join("apps/whoami").exists());

    s.core.apps.delete("whoami", false).await.unwrap();

    assert!(!s.dir.path().join("apps/whoami").exists());
    assert!(!s.dir.path().join("apps/.snapshots/whoami").exists());
    assert!(s.core.apps.get("whoami").unwrap().is_none());
}
