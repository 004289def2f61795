// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update endpoints.

use super::apps::JobAccepted;
use super::auth::AuthIdentity;
use super::sse::filtered_events;
use super::ApiResult;
use crate::lifecycle::Core;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::Sse;
use axum::Json;
use nos_core::{TxId, UpdateStateDoc};
use serde::Deserialize;
use std::sync::Arc;

pub async fn check(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
) -> ApiResult<Json<UpdateStateDoc>> {
    identity.require_admin()?;
    Ok(Json(core.updates.check().await?))
}

pub async fn status(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
) -> ApiResult<Json<UpdateStateDoc>> {
    Ok(Json(core.updates.status()?))
}

pub async fn apply(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    identity.require_admin()?;
    let updates = Arc::clone(&core.updates);
    let job_id = core.jobs.spawn("update.apply", move |cancel| async move {
        updates
            .apply(&cancel)
            .await
            .map(|tx_id| serde_json::json!({ "tx_id": tx_id }))
            .map_err(|e| e.body)
    });
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

#[derive(Deserialize)]
pub struct RollbackBody {
    pub tx_id: TxId,
}

pub async fn rollback(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Json(body): Json<RollbackBody>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    identity.require_admin()?;
    let updates = Arc::clone(&core.updates);
    let job_id = core.jobs.spawn("update.rollback", move |_cancel| async move {
        updates
            .rollback(&body.tx_id)
            .await
            .map(|tx_id| serde_json::json!({ "tx_id": tx_id }))
            .map_err(|e| e.body)
    });
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

/// SSE stream of update progress.
pub async fn progress(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
) -> Sse<
    impl tokio_stream::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>,
> {
    filtered_events(&core, |record| record.type_tag.starts_with("update."))
}
