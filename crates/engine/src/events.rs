// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event sink seam between the engines and the daemon's bus.
//!
//! Delivery is observational: engines publish and move on. Nothing in a
//! correctness-critical path may depend on an event arriving.

use nos_core::Event;

/// Where engines publish their events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: Event);
}

/// Sink that drops everything; used in tests and tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: Event) {}
}

/// Recording sink for tests.
#[cfg(any(test, feature = "test-support"))]
pub mod recording {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    pub struct RecordingSink {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<Event> {
            self.events.lock().clone()
        }

        pub fn types(&self) -> Vec<&'static str> {
            self.events.lock().iter().map(|e| e.type_tag()).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&self, event: Event) {
            self.events.lock().push(event);
        }
    }
}
