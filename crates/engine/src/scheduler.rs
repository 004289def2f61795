// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer management for the daemon's periodic work.
//!
//! The daemon loop ticks the scheduler at a fixed resolution and maps the
//! fired timer ids to actions (catalog refresh, retention prune, firewall
//! confirm deadlines).

use nos_core::TimerId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Timer entry
#[derive(Debug, Clone)]
struct Timer {
    fires_at: Instant,
    /// Re-armed with this period after firing, when set.
    period: Option<Duration>,
}

/// Manages timers for the daemon loop.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerId, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a one-shot timer.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration, now: Instant) {
        self.timers.insert(
            id,
            Timer {
                fires_at: now + duration,
                period: None,
            },
        );
    }

    /// Set a repeating timer.
    pub fn set_periodic(&mut self, id: TimerId, period: Duration, now: Instant) {
        self.timers.insert(
            id,
            Timer {
                fires_at: now + period,
                period: Some(period),
            },
        );
    }

    /// Cancel a timer.
    pub fn cancel_timer(&mut self, id: &TimerId) {
        self.timers.remove(id);
    }

    /// Drain all timers that have fired; periodic timers re-arm.
    pub fn fired_timers(&mut self, now: Instant) -> Vec<TimerId> {
        let mut fired = Vec::new();

        for (id, timer) in &mut self.timers {
            if timer.fires_at <= now {
                fired.push(id.clone());
                if let Some(period) = timer.period {
                    timer.fires_at = now + period;
                }
            }
        }

        for id in &fired {
            let one_shot = self
                .timers
                .get(id)
                .is_some_and(|t| t.period.is_none());
            if one_shot {
                self.timers.remove(id);
            }
        }

        fired
    }

    /// Next deadline across all timers, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.fires_at).min()
    }

    pub fn has_timer(&self, id: &TimerId) -> bool {
        self.timers.contains_key(id)
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
