// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! App endpoints.

use super::auth::AuthIdentity;
use super::sse::filtered_events;
use super::{ApiError, ApiResult};
use crate::lifecycle::Core;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::Sse;
use axum::Json;
use nos_core::{CatalogDocument, InstalledApp, JobId, SnapshotId, SnapshotRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Serialize)]
pub struct JobAccepted {
    pub job_id: JobId,
}

fn accepted(job_id: JobId) -> (StatusCode, Json<JobAccepted>) {
    (StatusCode::ACCEPTED, Json(JobAccepted { job_id }))
}

fn to_json(app: InstalledApp) -> serde_json::Value {
    serde_json::to_value(app).unwrap_or(serde_json::Value::Null)
}

#[derive(Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    refresh: bool,
}

pub async fn catalog(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<CatalogDocument>> {
    if query.refresh || !core.resolver.is_fresh() {
        core.sync_catalog().await?;
    }
    Ok(Json(core.resolver.merged()))
}

#[derive(Serialize)]
pub struct SyncSummary {
    pub sources_ok: u32,
    pub entries: u32,
    pub rejected: Vec<(String, String)>,
}

pub async fn catalog_sync(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
) -> ApiResult<Json<SyncSummary>> {
    identity.require_mutate()?;
    let report = core.sync_catalog().await?;
    Ok(Json(SyncSummary {
        sources_ok: report.sources_ok,
        entries: report.entries,
        rejected: report.rejected,
    }))
}

#[derive(Deserialize)]
pub struct InstallBody {
    pub id: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

pub async fn install(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Json(body): Json<InstallBody>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    identity.require_mutate()?;
    let apps = Arc::clone(&core.apps);
    let job_id = core.jobs.spawn("app.install", move |cancel| async move {
        apps.install(&body.id, body.params, &cancel)
            .await
            .map(to_json)
            .map_err(|e| e.body)
    });
    Ok(accepted(job_id))
}

pub async fn installed(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
) -> ApiResult<Json<Vec<InstalledApp>>> {
    Ok(Json(core.apps.list()?))
}

pub async fn detail(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<InstalledApp>> {
    core.apps
        .get(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::from(not_found(&id)))
}

fn not_found(id: &str) -> nos_core::ErrorBody {
    nos_core::ErrorBody::new(
        nos_core::ErrorKind::Validation,
        "not_found",
        format!("app not found: {id}"),
    )
}

pub async fn start(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<InstalledApp>> {
    identity.require_mutate()?;
    Ok(Json(core.apps.start(&id).await?))
}

pub async fn stop(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<InstalledApp>> {
    identity.require_mutate()?;
    Ok(Json(core.apps.stop(&id).await?))
}

pub async fn restart(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<InstalledApp>> {
    identity.require_mutate()?;
    Ok(Json(core.apps.restart(&id).await?))
}

#[derive(Deserialize)]
pub struct UpgradeBody {
    pub version: String,
    #[serde(default)]
    pub params: Option<BTreeMap<String, serde_json::Value>>,
}

pub async fn upgrade(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Path(id): Path<String>,
    Json(body): Json<UpgradeBody>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    identity.require_mutate()?;
    let apps = Arc::clone(&core.apps);
    let job_id = core.jobs.spawn("app.upgrade", move |cancel| async move {
        apps.upgrade(&id, &body.version, body.params, &cancel)
            .await
            .map(to_json)
            .map_err(|e| e.body)
    });
    Ok(accepted(job_id))
}

#[derive(Deserialize)]
pub struct RollbackBody {
    pub snapshot_id: SnapshotId,
}

pub async fn rollback(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Path(id): Path<String>,
    Json(body): Json<RollbackBody>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    identity.require_mutate()?;
    let apps = Arc::clone(&core.apps);
    let job_id = core.jobs.spawn("app.rollback", move |cancel| async move {
        apps.rollback(&id, &body.snapshot_id, &cancel)
            .await
            .map(to_json)
            .map_err(|e| e.body)
    });
    Ok(accepted(job_id))
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub keep_data: bool,
}

pub async fn remove(
    State(core): State<Arc<Core>>,
    identity: AuthIdentity,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> ApiResult<StatusCode> {
    identity.require_mutate()?;
    core.apps.delete(&id, query.keep_data).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn snapshots(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<SnapshotRef>>> {
    let app = core
        .apps
        .get(&id)?
        .ok_or_else(|| ApiError::from(not_found(&id)))?;
    Ok(Json(app.snapshots))
}

/// SSE stream of this app's events.
pub async fn events(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
    Path(id): Path<String>,
) -> Sse<impl tokio_stream::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    filtered_events(&core, move |record| record.target.as_deref() == Some(id.as_str()))
}
