// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity extraction and CSRF guard.
//!
//! Authentication lives outside the control plane: the fronting auth
//! layer resolves the session and forwards the principal in headers.
//! The daemon only performs role checks against it.

use super::{ApiError, ErrorEnvelope};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use nos_core::{ErrorBody, ErrorKind, Identity, Role};

/// Header carrying the resolved user id.
pub const USER_HEADER: &str = "x-nos-user";
/// Header carrying comma-separated roles.
pub const ROLES_HEADER: &str = "x-nos-roles";
/// Header set to `1` when the session passed MFA.
pub const MFA_HEADER: &str = "x-nos-mfa";
/// CSRF header required when the credential is a cookie.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Extractor wrapping the forwarded [`Identity`].
#[derive(Debug, Clone)]
pub struct AuthIdentity(pub Identity);

impl AuthIdentity {
    /// Operator-or-better, required by every mutating endpoint.
    pub fn require_mutate(&self) -> Result<(), ApiError> {
        if self.0.can_mutate() {
            Ok(())
        } else {
            Err(ApiError(ErrorBody::new(
                ErrorKind::Precondition,
                "forbidden",
                "this operation requires the operator or admin role",
            )))
        }
    }

    /// Admin role, required by updates, firewall, and recovery.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.has_role(Role::Admin) {
            Ok(())
        } else {
            Err(ApiError(ErrorBody::new(
                ErrorKind::Precondition,
                "forbidden",
                "this operation requires the admin role",
            )))
        }
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorEnvelope {
            error: ErrorBody::new(
                ErrorKind::Precondition,
                "auth_required",
                "no identity forwarded by the auth layer",
            ),
        }),
    )
        .into_response()
}

impl<S: Send + Sync> FromRequestParts<S> for AuthIdentity {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        let user_id = headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(unauthorized)?
            .to_string();

        let roles = headers
            .get(ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_roles)
            .unwrap_or_default();

        let mfa_verified = headers
            .get(MFA_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "1");

        let source_ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());

        Ok(AuthIdentity(Identity {
            user_id,
            roles,
            source_ip,
            mfa_verified,
        }))
    }
}

fn parse_roles(csv: &str) -> Vec<Role> {
    csv.split(',')
        .filter_map(|role| match role.trim() {
            "admin" => Some(Role::Admin),
            "operator" => Some(Role::Operator),
            "viewer" => Some(Role::Viewer),
            _ => None,
        })
        .collect()
}

/// Mutating requests authenticated by a cookie must carry the CSRF
/// header. Bearer-style credentials are immune to cross-site requests
/// and pass through.
pub async fn csrf_guard(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let mutating = matches!(
        *request.method(),
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    if mutating
        && request.headers().contains_key(axum::http::header::COOKIE)
        && !request.headers().contains_key(CSRF_HEADER)
    {
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorEnvelope {
                error: ErrorBody::new(
                    ErrorKind::Precondition,
                    "csrf_required",
                    "cookie-authenticated mutations require the x-csrf-token header",
                ),
            }),
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
