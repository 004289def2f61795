// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    admin = { "admin", vec![Role::Admin] },
    several = { "admin, viewer", vec![Role::Admin, Role::Viewer] },
    unknown_skipped = { "admin, root", vec![Role::Admin] },
    empty = { "", vec![] },
)]
fn role_parsing(csv: &str, expected: Vec<Role>) {
    assert_eq!(parse_roles(csv), expected);
}

#[test]
fn viewer_cannot_mutate() {
    let identity = AuthIdentity(Identity {
        user_id: "alex".into(),
        roles: vec![Role::Viewer],
        source_ip: None,
        mfa_verified: false,
    });
    assert!(identity.require_mutate().is_err());
    assert!(identity.require_admin().is_err());
}

#[test]
fn operator_mutates_but_is_not_admin() {
    let identity = AuthIdentity(Identity {
        user_id: "alex".into(),
        roles: vec![Role::Operator],
        source_ip: None,
        mfa_verified: false,
    });
    assert!(identity.require_mutate().is_ok());
    assert!(identity.require_admin().is_err());
}
