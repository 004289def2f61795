// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error classification and the wire error envelope.
//!
//! Every failure surfaced by the control plane falls into one of six kinds.
//! The kind determines the HTTP status and the stable `code` prefix in the
//! `{error: {code, message, details?}}` envelope.

use serde::{Deserialize, Serialize};

/// The six error kinds of the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input or failed schema validation.
    Validation,
    /// Conflicting state (already installed, update in progress, expired plan).
    Precondition,
    /// Agent or subprocess failure; carries captured stderr (truncated).
    External,
    /// Deadline exceeded; the cancellation path ran to rollback.
    Timeout,
    /// Digest or signature mismatch; the affected artifact is ignored.
    Integrity,
    /// Broken invariant detected at load; the daemon refuses to mutate state.
    Fatal,
}

impl ErrorKind {
    /// Stable code prefix used in wire error codes (e.g. `validation.params`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Precondition => "precondition",
            ErrorKind::External => "external",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional structured details attached to an error envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Field the validation failure refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Human hint on how to fix the input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Captured stderr from a failed external command (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl ErrorDetails {
    pub fn is_empty(&self) -> bool {
        self.field.is_none() && self.hint.is_none() && self.stderr.is_none()
    }
}

/// The typed error envelope body: `{code, message, details?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

impl ErrorBody {
    /// Build an envelope body with a `<kind>.<slug>` code.
    pub fn new(kind: ErrorKind, slug: &str, message: impl Into<String>) -> Self {
        Self {
            code: format!("{}.{}", kind.as_str(), slug),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.details
            .get_or_insert_with(ErrorDetails::default)
            .field = Some(field.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.details.get_or_insert_with(ErrorDetails::default).hint = Some(hint.into());
        self
    }

    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        let stderr = truncate_stderr(stderr.into());
        self.details
            .get_or_insert_with(ErrorDetails::default)
            .stderr = Some(stderr);
        self
    }

    /// The kind this body was built from, recovered from the code prefix.
    pub fn kind(&self) -> ErrorKind {
        match self.code.split('.').next() {
            Some("validation") => ErrorKind::Validation,
            Some("precondition") => ErrorKind::Precondition,
            Some("timeout") => ErrorKind::Timeout,
            Some("integrity") => ErrorKind::Integrity,
            Some("fatal") => ErrorKind::Fatal,
            _ => ErrorKind::External,
        }
    }
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Maximum stderr length carried in error details.
const MAX_STDERR_LEN: usize = 8 * 1024;

fn truncate_stderr(mut s: String) -> String {
    if s.len() > MAX_STDERR_LEN {
        // Truncate on a char boundary at or below the cap.
        let mut cut = MAX_STDERR_LEN;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("… [truncated]");
    }
    s
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
