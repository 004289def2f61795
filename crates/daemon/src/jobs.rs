// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of long-running API operations.
//!
//! Mutating endpoints that take more than a request's patience return
//! `202 Accepted` with a job id; clients poll the job or follow the SSE
//! stream for progress.

use nos_core::{CancelToken, ErrorBody, IdGen, JobId, UuidIdGen};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Where a job is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Succeeded,
    Failed,
}

/// A tracked background job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    /// What the job does, e.g. `app.install`.
    pub kind: String,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, JobStatus>,
    cancels: HashMap<JobId, CancelToken>,
}

/// In-memory job registry.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<Inner>>,
    id_gen: UuidIdGen,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked job. The future resolves to the job's result
    /// payload or the error envelope body.
    pub fn spawn<F>(&self, kind: &str, work: impl FnOnce(CancelToken) -> F) -> JobId
    where
        F: Future<Output = Result<serde_json::Value, ErrorBody>> + Send + 'static,
    {
        let id = JobId::new(self.id_gen.next());
        let cancel = CancelToken::new();
        {
            let mut inner = self.inner.lock();
            inner.jobs.insert(
                id.clone(),
                JobStatus {
                    id: id.clone(),
                    kind: kind.to_string(),
                    state: JobState::Running,
                    result: None,
                    error: None,
                    created_at: chrono::Utc::now(),
                    finished_at: None,
                },
            );
            inner.cancels.insert(id.clone(), cancel.clone());
        }

        let registry = self.clone();
        let job_id = id.clone();
        let future = work(cancel);
        tokio::spawn(async move {
            let outcome = future.await;
            let mut inner = registry.inner.lock();
            inner.cancels.remove(&job_id);
            if let Some(job) = inner.jobs.get_mut(&job_id) {
                job.finished_at = Some(chrono::Utc::now());
                match outcome {
                    Ok(result) => {
                        job.state = JobState::Succeeded;
                        job.result = Some(result);
                    }
                    Err(error) => {
                        job.state = JobState::Failed;
                        job.error = Some(error);
                    }
                }
            }
        });

        id
    }

    pub fn get(&self, id: &JobId) -> Option<JobStatus> {
        self.inner.lock().jobs.get(id).cloned()
    }

    /// Request cancellation of a running job.
    pub fn cancel(&self, id: &JobId) -> bool {
        match self.inner.lock().cancels.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
