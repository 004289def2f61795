// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use std::sync::Arc;

/// Records the phase calls made against it; fails where scripted.
struct ScriptedStep {
    name: String,
    fail_prepare: bool,
    fail_commit: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStep {
    fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
        Box::new(Self {
            name: name.to_string(),
            fail_prepare: false,
            fail_commit: false,
            log: Arc::clone(log),
        })
    }

    fn failing_prepare(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
        let mut step = Self::new(name, log);
        step.fail_prepare = true;
        step
    }

    fn failing_commit(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
        let mut step = Self::new(name, log);
        step.fail_commit = true;
        step
    }

    fn record(&self, phase: &str) {
        self.log.lock().push(format!("{}:{}", self.name, phase));
    }
}

#[async_trait]
impl TxStep for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(&mut self) -> Result<(), EngineError> {
        self.record("prepare");
        if self.fail_prepare {
            return Err(EngineError::external("test", "prepare boom"));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), EngineError> {
        self.record("commit");
        if self.fail_commit {
            return Err(EngineError::external("test", "commit boom"));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), EngineError> {
        self.record("rollback");
        Ok(())
    }
}

#[tokio::test]
async fn all_steps_commit_on_success() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut tx = TwoPhase::new();
    tx.push(ScriptedStep::new("a", &log));
    tx.push(ScriptedStep::new("b", &log));

    tx.run().await.unwrap();

    assert_eq!(
        *log.lock(),
        vec!["a:prepare", "b:prepare", "a:commit", "b:commit"]
    );
}

#[tokio::test]
async fn prepare_failure_rolls_back_prepared_steps_in_reverse() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut tx = TwoPhase::new();
    tx.push(ScriptedStep::new("a", &log));
    tx.push(ScriptedStep::new("b", &log));
    tx.push(ScriptedStep::failing_prepare("c", &log));

    let failure = tx.run().await.unwrap_err();
    assert!(failure.rollback_failures.is_empty());

    assert_eq!(
        *log.lock(),
        vec![
            "a:prepare",
            "b:prepare",
            "c:prepare",
            "b:rollback",
            "a:rollback"
        ]
    );
}

#[tokio::test]
async fn commit_failure_rolls_back_uncommitted_steps() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut tx = TwoPhase::new();
    tx.push(ScriptedStep::new("a", &log));
    tx.push(ScriptedStep::failing_commit("b", &log));
    tx.push(ScriptedStep::new("c", &log));

    tx.run().await.unwrap_err();

    // a committed and stays committed; b and c roll back (reverse order).
    assert_eq!(
        *log.lock(),
        vec![
            "a:prepare",
            "b:prepare",
            "c:prepare",
            "a:commit",
            "b:commit",
            "c:rollback",
            "b:rollback"
        ]
    );
}

#[tokio::test]
async fn empty_transaction_is_a_no_op() {
    TwoPhase::new().run().await.unwrap();
}

#[tokio::test]
async fn exactly_one_of_commit_or_rollback_runs_per_prepared_step() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut tx = TwoPhase::new();
    tx.push(ScriptedStep::new("a", &log));
    tx.push(ScriptedStep::failing_prepare("b", &log));

    tx.run().await.unwrap_err();

    let entries = log.lock().clone();
    let a_commits = entries.iter().filter(|e| *e == "a:commit").count();
    let a_rollbacks = entries.iter().filter(|e| *e == "a:rollback").count();
    assert_eq!(a_commits + a_rollbacks, 1);
}
