// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide metrics counters.
//!
//! The only package-level mutable state in the daemon; everything else
//! lives in the [`crate::Core`] built at startup.

use std::sync::atomic::{AtomicU64, Ordering};

pub static EVENTS_PUBLISHED: AtomicU64 = AtomicU64::new(0);
pub static EVENTS_DROPPED: AtomicU64 = AtomicU64::new(0);
pub static HTTP_REQUESTS: AtomicU64 = AtomicU64::new(0);

pub fn incr(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn get(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

/// Render the counters in Prometheus text exposition format.
pub fn render() -> String {
    format!(
        "# TYPE nosd_events_published_total counter\n\
         nosd_events_published_total {}\n\
         # TYPE nosd_events_dropped_total counter\n\
         nosd_events_dropped_total {}\n\
         # TYPE nosd_http_requests_total counter\n\
         nosd_http_requests_total {}\n",
        get(&EVENTS_PUBLISHED),
        get(&EVENTS_DROPPED),
        get(&HTTP_REQUESTS),
    )
}
