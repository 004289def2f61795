// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon-side agent client.
//!
//! Connects per call (the agent serves one request per connection), carries
//! a request id for idempotence, and retries transient transport failures
//! with backoff. The request id is stable across retries so the agent's
//! replay cache absorbs duplicates.

use crate::token::read_token;
use crate::wire::{self, ProtocolError, VerbRequest, VerbResponse, DEFAULT_IO_TIMEOUT};
use async_trait::async_trait;
use nos_core::{IdGen, RequestId, UuidIdGen};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UnixStream;
use tracing::{debug, warn};

/// Errors surfaced by agent calls.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent transport error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("agent token unreadable: {0}")]
    Token(std::io::Error),

    #[error("verb denied: {verb}")]
    Denied { verb: String },

    #[error("agent authentication failed: {code}")]
    Auth { code: String },

    #[error("verb {verb} failed: {message}")]
    Failed {
        verb: String,
        message: String,
        stderr: String,
        exit_code: Option<i32>,
    },
}

impl AgentError {
    /// Transient transport failures are worth retrying; verb-level
    /// failures are not.
    fn is_transient(&self) -> bool {
        matches!(
            self,
            AgentError::Protocol(ProtocolError::Io(_))
                | AgentError::Protocol(ProtocolError::ConnectionClosed)
                | AgentError::Protocol(ProtocolError::Timeout)
        )
    }
}

/// Output of a successful verb call.
#[derive(Debug, Clone, Default)]
pub struct VerbOutput {
    pub result: serde_json::Value,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Seam between the engine and the privileged agent.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn call(&self, verb: &str, args: serde_json::Value) -> Result<VerbOutput, AgentError>;
}

/// Maximum attempts for transient transport failures.
const MAX_ATTEMPTS: u32 = 3;

/// Base backoff between attempts (multiplied by the attempt number).
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Production client over the agent's Unix socket.
pub struct UnixAgentClient {
    socket_path: PathBuf,
    token_path: PathBuf,
    io_timeout: Duration,
    id_gen: UuidIdGen,
}

impl UnixAgentClient {
    pub fn new(socket_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            token_path: token_path.into(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            id_gen: UuidIdGen,
        }
    }

    async fn call_once(&self, request: &VerbRequest) -> Result<VerbResponse, AgentError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| AgentError::Protocol(ProtocolError::Io(e)))?;
        let (mut reader, mut writer) = stream.into_split();

        let data = wire::encode(request)?;
        tokio::time::timeout(self.io_timeout, wire::write_frame(&mut writer, &data))
            .await
            .map_err(|_| AgentError::Protocol(ProtocolError::Timeout))??;

        let bytes = tokio::time::timeout(self.io_timeout, wire::read_frame(&mut reader))
            .await
            .map_err(|_| AgentError::Protocol(ProtocolError::Timeout))??;
        Ok(wire::decode(&bytes)?)
    }
}

#[async_trait]
impl AgentClient for UnixAgentClient {
    async fn call(&self, verb: &str, args: serde_json::Value) -> Result<VerbOutput, AgentError> {
        let token = read_token(&self.token_path).map_err(AgentError::Token)?;
        let request = VerbRequest {
            id: RequestId::new(self.id_gen.next()),
            verb: verb.to_string(),
            args,
            token,
        };

        let mut last_err: Option<AgentError> = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.call_once(&request).await {
                Ok(response) => return response_to_output(verb, response),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    debug!(
                        verb,
                        attempt,
                        request_id = %request.id,
                        "transient agent failure, retrying: {}", e
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        // Unreachable in practice: the loop either returned or hit the
        // non-transient/final-attempt arm.
        Err(last_err.unwrap_or(AgentError::Protocol(ProtocolError::ConnectionClosed)))
    }
}

fn response_to_output(verb: &str, response: VerbResponse) -> Result<VerbOutput, AgentError> {
    if response.ok {
        return Ok(VerbOutput {
            result: response.result.unwrap_or(serde_json::Value::Null),
            stdout: response.stdout.unwrap_or_default(),
            stderr: response.stderr.unwrap_or_default(),
            exit_code: response.exit_code,
        });
    }

    let error = response.error.unwrap_or(wire::VerbErrorBody {
        code: "verb.unknown_error".into(),
        message: "agent returned failure without error body".into(),
        details: None,
    });

    match error.code.as_str() {
        "verb.denied" => {
            warn!(verb, "agent denied verb");
            Err(AgentError::Denied {
                verb: verb.to_string(),
            })
        }
        code if code.starts_with("auth.") => Err(AgentError::Auth {
            code: error.code,
        }),
        _ => Err(AgentError::Failed {
            verb: verb.to_string(),
            message: error.message,
            stderr: response.stderr.unwrap_or_default(),
            exit_code: response.exit_code,
        }),
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    //! Scriptable in-memory agent for tests.

    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};

    /// A scripted reply for one call.
    #[derive(Debug, Clone)]
    pub enum FakeReply {
        Ok(VerbOutput),
        Err { code: String, message: String },
    }

    impl FakeReply {
        pub fn ok() -> Self {
            FakeReply::Ok(VerbOutput::default())
        }

        pub fn ok_with_stdout(stdout: impl Into<String>) -> Self {
            FakeReply::Ok(VerbOutput {
                stdout: stdout.into(),
                exit_code: Some(0),
                ..VerbOutput::default()
            })
        }

        pub fn ok_with_result(result: serde_json::Value) -> Self {
            FakeReply::Ok(VerbOutput {
                result,
                exit_code: Some(0),
                ..VerbOutput::default()
            })
        }

        pub fn failed(message: impl Into<String>) -> Self {
            FakeReply::Err {
                code: "verb.failed".into(),
                message: message.into(),
            }
        }

        pub fn denied() -> Self {
            FakeReply::Err {
                code: "verb.denied".into(),
                message: "verb not in allowlist".into(),
            }
        }
    }

    #[derive(Default)]
    struct FakeState {
        calls: Vec<(String, serde_json::Value)>,
        queued: HashMap<String, VecDeque<FakeReply>>,
        defaults: HashMap<String, FakeReply>,
    }

    /// In-memory agent: records calls, replays scripted replies.
    ///
    /// Calls with no script default to success with empty output.
    #[derive(Default)]
    pub struct FakeAgent {
        state: Mutex<FakeState>,
    }

    impl FakeAgent {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a one-shot reply for the next call of `verb`.
        pub fn script(&self, verb: &str, reply: FakeReply) {
            self.state
                .lock()
                .queued
                .entry(verb.to_string())
                .or_default()
                .push_back(reply);
        }

        /// Set the standing reply for `verb` when the queue is empty.
        pub fn default_reply(&self, verb: &str, reply: FakeReply) {
            self.state.lock().defaults.insert(verb.to_string(), reply);
        }

        /// All calls recorded so far, in order.
        pub fn calls(&self) -> Vec<(String, serde_json::Value)> {
            self.state.lock().calls.clone()
        }

        /// Number of calls made for a verb.
        pub fn call_count(&self, verb: &str) -> usize {
            self.state.lock().calls.iter().filter(|(v, _)| v == verb).count()
        }
    }

    #[async_trait]
    impl AgentClient for FakeAgent {
        async fn call(&self, verb: &str, args: serde_json::Value) -> Result<VerbOutput, AgentError> {
            let reply = {
                let mut state = self.state.lock();
                state.calls.push((verb.to_string(), args));
                state
                    .queued
                    .get_mut(verb)
                    .and_then(|q| q.pop_front())
                    .or_else(|| state.defaults.get(verb).cloned())
            };

            match reply {
                None => Ok(VerbOutput {
                    exit_code: Some(0),
                    ..VerbOutput::default()
                }),
                Some(FakeReply::Ok(output)) => Ok(output),
                Some(FakeReply::Err { code, message }) => match code.as_str() {
                    "verb.denied" => Err(AgentError::Denied {
                        verb: verb.to_string(),
                    }),
                    code if code.starts_with("auth.") => Err(AgentError::Auth {
                        code: code.to_string(),
                    }),
                    _ => Err(AgentError::Failed {
                        verb: verb.to_string(),
                        message,
                        stderr: String::new(),
                        exit_code: Some(1),
                    }),
                },
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
