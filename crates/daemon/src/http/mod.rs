// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned HTTP API on loopback.
//!
//! Every error is the typed envelope `{error: {code, message, details?}}`.
//! Mutating endpoints require an `Identity` with an operator role,
//! plus a CSRF header when the credential is a cookie. Long-running
//! operations return `202` with a job id.

mod apps;
mod auth;
mod firewall;
mod recovery;
mod sse;
mod updates;

pub use auth::AuthIdentity;

use crate::lifecycle::Core;
use crate::metrics;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nos_core::{ErrorBody, ErrorKind, JobId};
use nos_engine::EngineError;
use serde::Serialize;
use std::sync::Arc;

/// The typed error envelope.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// An API error: envelope body plus its HTTP status.
#[derive(Debug)]
pub struct ApiError(pub ErrorBody);

impl ApiError {
    fn status(&self) -> StatusCode {
        if self.0.code.ends_with(".not_found") {
            return StatusCode::NOT_FOUND;
        }
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Precondition => StatusCode::CONFLICT,
            ErrorKind::External | ErrorKind::Integrity => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorEnvelope { error: self.0 })).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err.body)
    }
}

impl From<ErrorBody> for ApiError {
    fn from(body: ErrorBody) -> Self {
        Self(body)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Build the daemon's router.
pub fn router(core: Arc<Core>) -> Router {
    let v1 = Router::new()
        // apps
        .route("/apps/catalog", get(apps::catalog))
        .route("/apps/catalog/sync", post(apps::catalog_sync))
        .route("/apps/install", post(apps::install))
        .route("/apps/installed", get(apps::installed))
        .route("/apps/{id}", get(apps::detail).delete(apps::remove))
        .route("/apps/{id}/start", post(apps::start))
        .route("/apps/{id}/stop", post(apps::stop))
        .route("/apps/{id}/restart", post(apps::restart))
        .route("/apps/{id}/upgrade", post(apps::upgrade))
        .route("/apps/{id}/rollback", post(apps::rollback))
        .route("/apps/{id}/snapshots", get(apps::snapshots))
        .route("/apps/{id}/events", get(apps::events))
        // updates
        .route("/updates/check", get(updates::check))
        .route("/updates/status", get(updates::status))
        .route("/updates/apply", post(updates::apply))
        .route("/updates/rollback", post(updates::rollback))
        .route("/updates/progress", get(updates::progress))
        // firewall
        .route("/net/firewall/plan", post(firewall::plan))
        .route("/net/firewall/plan/{id}", get(firewall::plan_detail))
        .route("/net/firewall/apply", post(firewall::apply))
        .route("/net/firewall/confirm", post(firewall::confirm))
        .route("/net/firewall/rollback", post(firewall::rollback))
        .route("/net/firewall/state", get(firewall::state))
        // events + jobs
        .route("/events", get(events_tail))
        .route("/events/stream", get(sse::all_events))
        .route("/jobs/{id}", get(job_status))
        // recovery (loopback + boot flag, checked in the handlers)
        .route("/recovery/reset-password", post(recovery::reset_password))
        .route("/recovery/disable-2fa", post(recovery::disable_2fa))
        .route("/recovery/generate-otp", post(recovery::generate_otp))
        .layer(axum::middleware::from_fn(auth::csrf_guard));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .nest("/v1", v1)
        .layer(axum::middleware::from_fn(count_requests))
        .with_state(core)
}

async fn count_requests(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    metrics::incr(&metrics::HTTP_REQUESTS);
    next.run(request).await
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    version: &'static str,
    uptime_secs: u64,
}

async fn health(State(core): State<Arc<Core>>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: core.start_time.elapsed().as_secs(),
    })
}

async fn metrics_text() -> String {
    metrics::render()
}

#[derive(serde::Deserialize)]
struct EventsQuery {
    after: Option<String>,
    limit: Option<usize>,
}

async fn events_tail(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
    axum::extract::Query(query): axum::extract::Query<EventsQuery>,
) -> Json<Vec<nos_core::EventRecord>> {
    let limit = query.limit.unwrap_or(100).min(1000);
    Json(core.bus.recent(query.after.as_deref(), limit))
}

async fn job_status(
    State(core): State<Arc<Core>>,
    _identity: AuthIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<crate::jobs::JobStatus>> {
    core.jobs
        .get(&JobId::new(id.clone()))
        .map(Json)
        .ok_or_else(|| {
            ApiError(ErrorBody::new(
                ErrorKind::Validation,
                "not_found",
                format!("job not found: {id}"),
            ))
        })
}

#[cfg(test)]
#[path = "../http_tests.rs"]
mod tests;
