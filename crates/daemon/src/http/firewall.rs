// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Firewall / remote-access endpoints.

use super::auth::AuthIdentity;
use super::{ApiError, ApiResult};
use crate::lifecycle::Core;
use axum::extract::{Path, State};
use axum::Json;
use nos_core::{ErrorBody, ErrorKind, FirewallMode, FirewallPlan, FirewallState, PendingApply, PlanId};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Deserialize)]
pub struct PlanBody {
    pub mode: FirewallMode,
}

pub async fn plan(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Json(body): Json<PlanBody>,
) -> ApiResult<Json<FirewallPlan>> {
    identity.require_admin()?;
    Ok(Json(core.firewall.plan(body.mode)))
}

pub async fn plan_detail(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<FirewallPlan>> {
    core.firewall
        .plan_by_id(&PlanId::new(id.clone()))
        .map(Json)
        .ok_or_else(|| {
            ApiError(ErrorBody::new(
                ErrorKind::Validation,
                "not_found",
                format!("plan not found: {id}"),
            ))
        })
}

#[derive(Deserialize)]
pub struct ApplyBody {
    pub plan_id: PlanId,
    /// Confirm window in seconds; defaults to 60.
    pub rollback_timeout_secs: Option<u64>,
}

pub async fn apply(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Json(body): Json<ApplyBody>,
) -> ApiResult<Json<PendingApply>> {
    identity.require_admin()?;
    let timeout = Duration::from_secs(body.rollback_timeout_secs.unwrap_or(60).clamp(5, 600));
    let pending = core.firewall.apply(&body.plan_id, timeout).await?;
    Ok(Json(pending))
}

#[derive(Deserialize)]
pub struct ConfirmBody {
    pub plan_id: PlanId,
}

pub async fn confirm(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Json(body): Json<ConfirmBody>,
) -> ApiResult<Json<FirewallState>> {
    identity.require_admin()?;
    Ok(Json(core.firewall.confirm(&body.plan_id, &identity.0).await?))
}

#[derive(Deserialize)]
pub struct RollbackBody {
    pub plan_id: PlanId,
}

pub async fn rollback(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Json(body): Json<RollbackBody>,
) -> ApiResult<Json<FirewallState>> {
    identity.require_admin()?;
    Ok(Json(core.firewall.rollback(&body.plan_id).await?))
}

pub async fn state(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
) -> ApiResult<Json<FirewallState>> {
    Ok(Json(core.firewall.state()))
}
