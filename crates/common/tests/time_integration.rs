//! Integration tests for the `time` module.
//!
//! Components hold a `SharedClock`; these tests check that a test keeping a
//! `MockClock` handle can move time for every component sharing it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use novem_common::{Clock, MockClock, SharedClock, SystemClock};

struct Deadline {
    clock: SharedClock,
    at: chrono::DateTime<Utc>,
}

impl Deadline {
    fn passed(&self) -> bool {
        self.clock.now() >= self.at
    }
}

#[test]
fn test_mock_clock_drives_shared_components() {
    let clock = Arc::new(MockClock::starting_at_unix(1_700_000_000));
    let at = Utc.timestamp_opt(1_700_000_000 + 7 * 24 * 3600, 0).unwrap();
    let deadline = Deadline { clock: clock.clone(), at };

    clock.advance(Duration::from_secs(7 * 24 * 3600 - 1));
    assert!(!deadline.passed());

    clock.advance(Duration::from_secs(1));
    assert!(deadline.passed());
}

#[test]
fn test_out_of_range_start_falls_back_to_epoch() {
    let clock = MockClock::starting_at_unix(i64::MAX);
    assert_eq!(clock.unix_seconds(), 0);
}

#[test]
fn test_system_clock_is_shareable() {
    let clock = SystemClock::shared();
    let other = Arc::clone(&clock);
    assert!(other.unix_seconds() >= clock.unix_seconds() - 1);
}
