// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! NithronOS control-plane daemon library.
//!
//! The binary (`nosd`) wires configuration, the privileged-agent client,
//! and the engines into a [`lifecycle::Core`], then serves the HTTP API
//! on loopback and runs the background scheduler.

pub mod config;
pub mod events;
pub mod http;
pub mod jobs;
pub mod lifecycle;
pub mod metrics;
pub mod recovery;

pub use config::Config;
pub use events::EventBus;
pub use jobs::{JobRegistry, JobState};
pub use lifecycle::Core;
