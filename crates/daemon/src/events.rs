// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event bus with an append-only journal.
//!
//! Publishing never blocks and never fails: the journal append is
//! best-effort, and the bounded broadcast channel drops for lagging
//! subscribers with a dead-letter log line and a counter bump. No
//! correctness-critical path relies on delivery.

use crate::metrics;
use nos_core::{Event, EventRecord, IdGen, UuidIdGen};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::warn;

/// Bounded channel capacity; slow subscribers past this lag drop events.
const BUS_CAPACITY: usize = 256;

/// The daemon's event bus.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EventRecord>,
    journal_path: PathBuf,
    journal_lock: std::sync::Arc<Mutex<()>>,
    id_gen: UuidIdGen,
}

impl EventBus {
    pub fn new(journal_path: impl Into<PathBuf>) -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self {
            tx,
            journal_path: journal_path.into(),
            journal_lock: std::sync::Arc::new(Mutex::new(())),
            id_gen: UuidIdGen,
        }
    }

    /// Publish with an explicit actor (API handlers pass the user id).
    pub fn publish_as(&self, actor: &str, event: Event) -> EventRecord {
        let record = EventRecord::new(
            self.id_gen.next(),
            actor,
            chrono::Utc::now(),
            event,
        );
        self.append_journal(&record);
        metrics::incr(&metrics::EVENTS_PUBLISHED);
        // No receivers is fine; lagging receivers handle their own drops.
        let _ = self.tx.send(record.clone());
        record
    }

    /// Subscribe to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.tx.subscribe()
    }

    /// Read journal records after the given event id (exclusive), up to
    /// `limit`. `None` starts from the beginning.
    pub fn recent(&self, after: Option<&str>, limit: usize) -> Vec<EventRecord> {
        let _guard = self.journal_lock.lock();
        let Ok(text) = std::fs::read_to_string(&self.journal_path) else {
            return Vec::new();
        };

        let mut records: Vec<EventRecord> = text
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();

        if let Some(after) = after {
            if let Some(pos) = records.iter().position(|r| r.id == after) {
                records.drain(..=pos);
            }
        }

        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
        records
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }

    fn append_journal(&self, record: &EventRecord) {
        let _guard = self.journal_lock.lock();
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.journal_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.journal_path)?;
            let line = serde_json::to_string(record)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{line}")?;
            Ok(())
        })();

        if let Err(e) = result {
            warn!(event = %record.type_tag, "journal append failed: {}", e);
        }
    }
}

impl nos_engine::EventSink for EventBus {
    fn publish(&self, event: Event) {
        self.publish_as("system", event);
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
