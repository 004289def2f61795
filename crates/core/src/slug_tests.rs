// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use std::path::PathBuf;
use yare::parameterized;

#[parameterized(
    etc = { "/etc", "etc" },
    nested = { "/var/lib/nos", "var-lib-nos" },
    root = { "/", "root" },
    relative = { "srv/apps/whoami", "srv-apps-whoami" },
    messy = { "/srv//apps..weird/", "srv-apps-weird" },
)]
fn slugify_paths(input: &str, expected: &str) {
    assert_eq!(slugify(&PathBuf::from(input)), expected);
}

#[test]
fn timestamp_slug_format() {
    let at = Utc.with_ymd_and_hms(2026, 2, 13, 15, 45, 2).unwrap();
    assert_eq!(timestamp_slug(at), "20260213-154502");
}
