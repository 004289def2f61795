// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn one_shot_timer_fires_once() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();
    scheduler.set_timer(TimerId::catalog_refresh(), Duration::from_secs(5), now);

    assert!(scheduler.fired_timers(now).is_empty());

    let fired = scheduler.fired_timers(now + Duration::from_secs(6));
    assert_eq!(fired, vec![TimerId::catalog_refresh()]);

    // Gone after firing
    assert!(scheduler
        .fired_timers(now + Duration::from_secs(60))
        .is_empty());
}

#[test]
fn periodic_timer_re_arms() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();
    scheduler.set_periodic(TimerId::retention_prune(), Duration::from_secs(10), now);

    let fired = scheduler.fired_timers(now + Duration::from_secs(11));
    assert_eq!(fired.len(), 1);

    // Still armed for the next period
    assert!(scheduler.has_timer(&TimerId::retention_prune()));
    let fired = scheduler.fired_timers(now + Duration::from_secs(22));
    assert_eq!(fired.len(), 1);
}

#[test]
fn cancel_removes_timer() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();
    let id = TimerId::firewall_confirm(&nos_core::PlanId::new("p1"));
    scheduler.set_timer(id.clone(), Duration::from_secs(60), now);

    scheduler.cancel_timer(&id);
    assert!(!scheduler.has_timer(&id));
    assert!(scheduler
        .fired_timers(now + Duration::from_secs(120))
        .is_empty());
}

#[test]
fn next_deadline_is_the_earliest() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();
    scheduler.set_timer(TimerId::catalog_refresh(), Duration::from_secs(60), now);
    scheduler.set_timer(TimerId::retention_prune(), Duration::from_secs(10), now);

    assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_secs(10)));
}
