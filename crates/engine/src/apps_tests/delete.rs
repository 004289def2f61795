// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use nos_core::ErrorKind;

async fn installed(h: &Harness) {
    h.manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_without_keep_data_empties_the_tree() {
    let h = harness();
    installed(&h).await;
    std::fs::write(h.dir.path().join("apps/whoami/data/state.db"), b"data").unwrap();

    h.manager.delete("whoami", false).await.unwrap();

    // Tree, snapshots, registry record, proxy snippet: all gone
    assert!(!h.dir.path().join("apps/whoami").exists());
    assert!(!h.dir.path().join("apps/.snapshots/whoami").exists());
    assert!(h.manager.get("whoami").unwrap().is_none());
    assert!(!h.dir.path().join("proxy.d/app-whoami").exists());

    assert!(h.events.types().contains(&"app.deleted"));
    // Unit deregistered and proxy reloaded
    assert!(h.agent.call_count("container.compose.down") >= 1);
    assert!(h.agent.call_count("proxy.reload") >= 2);
}

#[tokio::test]
async fn delete_with_keep_data_preserves_the_tree() {
    let h = harness();
    installed(&h).await;
    std::fs::write(h.dir.path().join("apps/whoami/data/state.db"), b"data").unwrap();

    h.manager.delete("whoami", true).await.unwrap();

    assert!(h.dir.path().join("apps/whoami/data/state.db").exists());
    assert!(h.manager.get("whoami").unwrap().is_none());
}

#[tokio::test]
async fn install_after_full_delete_works() {
    let h = harness();
    installed(&h).await;
    h.manager.delete("whoami", false).await.unwrap();

    let app = h
        .manager
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(app.status, AppStatus::Running);
}

#[tokio::test]
async fn delete_unknown_app_fails() {
    let h = harness();
    let err = h.manager.delete("ghost", false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
