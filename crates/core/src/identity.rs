// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity as provided by the external auth subsystem.
//!
//! The control plane never authenticates; it consumes an already-resolved
//! principal and performs role checks against it.

use serde::{Deserialize, Serialize};

/// Role granted to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Operator,
    Viewer,
}

/// Opaque principal attached to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(default)]
    pub mfa_verified: bool,
}

impl Identity {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Admins implicitly hold every lesser role.
    pub fn can_mutate(&self) -> bool {
        self.has_role(Role::Admin) || self.has_role(Role::Operator)
    }
}
