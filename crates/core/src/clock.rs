// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction so time-driven paths are testable.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Source of wall-clock and monotonic time.
pub trait Clock: Send + Sync {
    /// Wall-clock time, used for persisted timestamps and snapshot slugs.
    fn now(&self) -> DateTime<Utc>;
    /// Monotonic time, used for deadlines and timers.
    fn monotonic(&self) -> Instant;
}

/// Production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests.
#[derive(Clone)]
pub struct FakeClock {
    inner: std::sync::Arc<parking_lot::Mutex<FakeClockInner>>,
}

struct FakeClockInner {
    now: DateTime<Utc>,
    base: Instant,
    offset: Duration,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            inner: std::sync::Arc::new(parking_lot::Mutex::new(FakeClockInner {
                now,
                base: Instant::now(),
                offset: Duration::ZERO,
            })),
        }
    }

    /// Advance both wall-clock and monotonic time.
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock();
        inner.now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
        inner.offset += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().now
    }

    fn monotonic(&self) -> Instant {
        let inner = self.inner.lock();
        inner.base + inner.offset
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
