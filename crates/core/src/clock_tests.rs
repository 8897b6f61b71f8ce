// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advance_is_shared_between_clones() {
    let clock = FakeClock::new();
    let other = clock.clone();
    let start = clock.now();

    other.advance(Duration::from_secs(30));

    assert_eq!(clock.now().duration_since(start), Duration::from_secs(30));
}

#[test]
fn deadline_expires_only_after_budget() {
    let clock = FakeClock::new();
    let deadline = Deadline::after(&clock, Duration::from_secs(2));

    assert!(!deadline.is_expired(clock.now()));
    clock.advance(Duration::from_secs(2));
    assert!(!deadline.is_expired(clock.now()));
    clock.advance(Duration::from_millis(1));
    assert!(deadline.is_expired(clock.now()));
}

#[test]
fn deadline_remaining_saturates_at_zero() {
    let clock = FakeClock::new();
    let deadline = Deadline::after(&clock, Duration::from_secs(5));

    clock.advance(Duration::from_secs(3));
    assert_eq!(deadline.remaining(clock.now()), Duration::from_secs(2));

    clock.advance(Duration::from_secs(10));
    assert_eq!(deadline.remaining(clock.now()), Duration::ZERO);
    assert_eq!(deadline.budget(), Duration::from_secs(5));
}
