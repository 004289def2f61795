// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery endpoints: loopback-only, enabled by the boot flag.
//!
//! These deliberately skip the identity extractor — recovery exists for
//! the administrator who can no longer authenticate. Physical/console
//! access is the credential: the boot flag plus a loopback connection.

use super::{ApiError, ApiResult};
use crate::lifecycle::Core;
use crate::recovery;
use axum::extract::{ConnectInfo, State};
use axum::Json;
use nos_core::{ErrorBody, ErrorKind, Event};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

fn guard(core: &Core, addr: &SocketAddr) -> Result<(), ApiError> {
    if !core.config.recovery_mode {
        return Err(ApiError(ErrorBody::new(
            ErrorKind::Precondition,
            "recovery_disabled",
            "recovery mode is not enabled on this boot",
        )));
    }
    if !addr.ip().is_loopback() {
        return Err(ApiError(ErrorBody::new(
            ErrorKind::Precondition,
            "loopback_only",
            "recovery endpoints are only reachable from loopback",
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
pub struct UserBody {
    pub user: String,
}

#[derive(Serialize)]
pub struct Ack {
    pub ok: bool,
}

pub async fn reset_password(
    State(core): State<Arc<Core>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<Ack>> {
    guard(&core, &addr)?;
    recovery::reset_password(&core.config.recovery_dir(), &body.user)?;
    Ok(Json(Ack { ok: true }))
}

pub async fn disable_2fa(
    State(core): State<Arc<Core>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<UserBody>,
) -> ApiResult<Json<Ack>> {
    guard(&core, &addr)?;
    recovery::disable_2fa(&core.config.recovery_dir(), &body.user)?;
    Ok(Json(Ack { ok: true }))
}

#[derive(Serialize)]
pub struct OtpBody {
    pub otp: String,
}

pub async fn generate_otp(
    State(core): State<Arc<Core>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> ApiResult<Json<OtpBody>> {
    guard(&core, &addr)?;
    let otp = recovery::generate_otp(&core.config.recovery_dir())?;
    core.bus.publish_as("recovery", Event::RecoveryOtpGenerated);
    Ok(Json(OtpBody { otp }))
}
