//! Clock trait with system and mock implementations
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use novem_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(90));
//! assert_eq!((clock.now() - start).num_seconds(), 90);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

/// Source of wall clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Seconds since the UNIX epoch, matching the JWT `exp` claim unit.
    fn unix_seconds(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Clock shared between the components of one client.
pub type SharedClock = Arc<dyn Clock>;

/// Real system clock. Use this in production code.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Shared handle to the system clock.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic tests.
///
/// Cloning shares the elapsed offset, so a test can keep one handle and give
/// another to the component under test.
#[derive(Debug, Clone)]
pub struct MockClock {
    base: DateTime<Utc>,
    elapsed: Arc<Mutex<chrono::Duration>>,
}

impl MockClock {
    /// Mock clock starting at the current real time.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Mock clock starting at a fixed instant.
    #[must_use]
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self { base, elapsed: Arc::new(Mutex::new(chrono::Duration::zero())) }
    }

    /// Mock clock starting at a UNIX timestamp (seconds).
    ///
    /// Out-of-range timestamps fall back to the epoch.
    #[must_use]
    pub fn starting_at_unix(seconds: i64) -> Self {
        let base = Utc.timestamp_opt(seconds, 0).single().unwrap_or(DateTime::UNIX_EPOCH);
        Self::starting_at(base)
    }

    /// Simulate time passing.
    pub fn advance(&self, by: Duration) {
        if let Ok(delta) = chrono::Duration::from_std(by) {
            let mut elapsed = self.elapsed.lock();
            *elapsed += delta;
        }
    }

    /// Replace the elapsed offset from the starting instant.
    pub fn set_elapsed(&self, elapsed: Duration) {
        if let Ok(delta) = chrono::Duration::from_std(elapsed) {
            *self.elapsed.lock() = delta;
        }
    }

    /// Offset from the starting instant.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        *self.elapsed.lock()
    }

    /// Shared handle for injection into components.
    #[must_use]
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + *self.elapsed.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_without_sleeping() {
        let clock = MockClock::starting_at_unix(1_700_000_000);
        assert_eq!(clock.unix_seconds(), 1_700_000_000);

        clock.advance(Duration::from_secs(30));
        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.unix_seconds(), 1_700_000_060);
        assert_eq!(clock.elapsed().num_seconds(), 60);
    }

    #[test]
    fn clones_share_elapsed_time() {
        let clock = MockClock::starting_at_unix(0);
        let shared = clock.shared();

        clock.advance(Duration::from_secs(7 * 24 * 3600));
        assert_eq!(shared.unix_seconds(), 7 * 24 * 3600);
    }

    #[test]
    fn set_elapsed_replaces_offset() {
        let clock = MockClock::starting_at_unix(100);
        clock.advance(Duration::from_secs(50));
        clock.set_elapsed(Duration::from_secs(10));
        assert_eq!(clock.unix_seconds(), 110);
    }

    #[test]
    fn system_clock_tracks_real_time() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
