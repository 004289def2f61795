// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-sent event streams over the event bus.
//!
//! A subscriber that lags past the bus capacity drops events: the drop
//! is logged as a dead letter and counted, never retried — the journal
//! endpoint is the catch-up path.

use crate::lifecycle::Core;
use crate::metrics;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use nos_core::EventRecord;
use std::convert::Infallible;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

/// SSE stream of every event record.
pub async fn all_events(
    axum::extract::State(core): axum::extract::State<std::sync::Arc<Core>>,
    _identity: super::AuthIdentity,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    filtered_events(&core, |_| true)
}

/// SSE stream of records matching the filter.
pub fn filtered_events<F>(
    core: &Core,
    filter: F,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>>
where
    F: Fn(&EventRecord) -> bool + Send + 'static,
{
    let stream = BroadcastStream::new(core.bus.subscribe()).filter_map(move |item| match item {
        Ok(record) if filter(&record) => Some(Ok(to_sse(&record))),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(count)) => {
            // Dead letter: the subscriber was too slow for the bounded
            // bus; correctness never depends on delivery.
            warn!(dropped = count, "SSE subscriber lagged, events dropped");
            for _ in 0..count {
                metrics::incr(&metrics::EVENTS_DROPPED);
            }
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse(record: &EventRecord) -> SseEvent {
    let data = serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default()
        .id(record.id.clone())
        .event(record.type_tag.clone())
        .data(data)
}
