//! Time abstractions
//!
//! Token expiry and the offline grace window are both measured against wall
//! clock time, so everything that reads "now" goes through [`Clock`]. Tests
//! swap in [`MockClock`] to cross expiry boundaries without sleeping.

pub mod clock;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
