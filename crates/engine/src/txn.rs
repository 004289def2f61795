// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Two-phase operation orchestration.
//!
//! Each step exposes prepare/commit/rollback; the orchestrator drives the
//! phases and guarantees exactly one of commit or rollback runs for every
//! prepared step. Rollback runs in reverse preparation order.

use crate::error::EngineError;
use async_trait::async_trait;
use tracing::{debug, warn};

/// One reversible step of a multi-step mutation.
#[async_trait]
pub trait TxStep: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Do the work, leaving enough state behind to undo it.
    async fn prepare(&mut self) -> Result<(), EngineError>;

    /// Make the work permanent (drop backups, delete staging).
    async fn commit(&mut self) -> Result<(), EngineError>;

    /// Undo prepared work.
    async fn rollback(&mut self) -> Result<(), EngineError>;
}

/// Outcome of a failed run: the original error plus any rollback failures.
#[derive(Debug)]
pub struct TwoPhaseFailure {
    pub error: EngineError,
    /// Names of steps whose rollback also failed (preserved for manual
    /// recovery).
    pub rollback_failures: Vec<String>,
}

/// Orchestrator for a sequence of [`TxStep`]s.
#[derive(Default)]
pub struct TwoPhase {
    steps: Vec<Box<dyn TxStep>>,
}

impl TwoPhase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Box<dyn TxStep>) {
        self.steps.push(step);
    }

    /// Prepare every step in order, then commit every step.
    ///
    /// On any prepare failure, every already-prepared step is rolled back
    /// in reverse order. On a commit failure, the failed step and all
    /// not-yet-committed steps are rolled back; already-committed steps
    /// stay committed.
    pub async fn run(mut self) -> Result<(), TwoPhaseFailure> {
        let mut prepared = 0usize;

        for i in 0..self.steps.len() {
            debug!(step = self.steps[i].name(), "prepare");
            if let Err(error) = self.steps[i].prepare().await {
                warn!(step = self.steps[i].name(), "prepare failed: {}", error);
                let rollback_failures = rollback_range(&mut self.steps, 0, prepared).await;
                return Err(TwoPhaseFailure {
                    error,
                    rollback_failures,
                });
            }
            prepared = i + 1;
        }

        for i in 0..self.steps.len() {
            debug!(step = self.steps[i].name(), "commit");
            if let Err(error) = self.steps[i].commit().await {
                warn!(step = self.steps[i].name(), "commit failed: {}", error);
                // The failing step and everything after it still hold
                // their rollback state; run them in reverse.
                let rollback_failures = rollback_range(&mut self.steps, i, prepared).await;
                return Err(TwoPhaseFailure {
                    error,
                    rollback_failures,
                });
            }
        }

        Ok(())
    }
}

/// Roll back steps[from..to] in reverse order, collecting failures.
async fn rollback_range(
    steps: &mut [Box<dyn TxStep>],
    from: usize,
    to: usize,
) -> Vec<String> {
    let mut failures = Vec::new();
    for i in (from..to).rev() {
        debug!(step = steps[i].name(), "rollback");
        if let Err(e) = steps[i].rollback().await {
            warn!(step = steps[i].name(), "rollback failed: {}", e);
            failures.push(steps[i].name().to_string());
        }
    }
    failures
}

#[cfg(test)]
#[path = "txn_tests.rs"]
mod tests;
