// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type, classified by the six control-plane error kinds.

use nos_agent::AgentError;
use nos_core::{ErrorBody, ErrorKind};
use nos_store::StoreError;
use thiserror::Error;

/// An engine failure carrying its wire envelope body.
#[derive(Debug, Error)]
#[error("{body}")]
pub struct EngineError {
    pub body: ErrorBody,
}

impl EngineError {
    pub fn new(body: ErrorBody) -> Self {
        Self { body }
    }

    pub fn kind(&self) -> ErrorKind {
        self.body.kind()
    }

    pub fn validation(slug: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorBody::new(ErrorKind::Validation, slug, message))
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self::new(
            ErrorBody::new(
                ErrorKind::Validation,
                "not_found",
                format!("{what} not found: {id}"),
            )
            .with_field(what.to_string()),
        )
    }

    pub fn precondition(slug: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorBody::new(ErrorKind::Precondition, slug, message))
    }

    pub fn external(slug: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorBody::new(ErrorKind::External, slug, message))
    }

    pub fn timeout(slug: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorBody::new(ErrorKind::Timeout, slug, message))
    }

    pub fn integrity(slug: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorBody::new(ErrorKind::Integrity, slug, message))
    }

    pub fn fatal(slug: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorBody::new(ErrorKind::Fatal, slug, message))
    }

    pub fn io(slug: &str, err: std::io::Error) -> Self {
        Self::external(slug, err.to_string())
    }
}

impl From<ErrorBody> for EngineError {
    fn from(body: ErrorBody) -> Self {
        Self { body }
    }
}

impl From<AgentError> for EngineError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Denied { verb } => Self::new(ErrorBody::new(
                ErrorKind::External,
                "verb.denied",
                format!("agent denied verb: {verb}"),
            )),
            AgentError::Auth { code } => Self::new(ErrorBody::new(
                ErrorKind::External,
                "agent_auth",
                format!("agent rejected credentials: {code}"),
            )),
            AgentError::Failed {
                verb,
                message,
                stderr,
                exit_code,
            } => {
                let mut body = ErrorBody::new(
                    ErrorKind::External,
                    "agent",
                    format!("{verb}: {message} (exit {exit_code:?})"),
                );
                if !stderr.is_empty() {
                    body = body.with_stderr(stderr);
                }
                Self::new(body)
            }
            AgentError::Protocol(e) => Self::new(ErrorBody::new(
                ErrorKind::External,
                "agent_transport",
                e.to_string(),
            )),
            AgentError::Token(e) => Self::new(ErrorBody::new(
                ErrorKind::Fatal,
                "agent_token",
                format!("agent token unreadable: {e}"),
            )),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::LockHeld { .. } => {
                Self::new(ErrorBody::new(ErrorKind::Precondition, "lock_held", err.to_string()))
            }
            StoreError::Corrupt { .. } | StoreError::NewerVersion { .. } => {
                Self::new(ErrorBody::new(ErrorKind::Fatal, "state", err.to_string()))
            }
            StoreError::TxNotFound(_) => Self::not_found("transaction", &err.to_string()),
            StoreError::TxState { .. } => {
                Self::new(ErrorBody::new(ErrorKind::Precondition, "tx_state", err.to_string()))
            }
            StoreError::Io(_) | StoreError::Json(_) => {
                Self::new(ErrorBody::new(ErrorKind::External, "store_io", err.to_string()))
            }
        }
    }
}
