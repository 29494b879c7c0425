//! Modular common utilities shared across Novem crates.
//!
//! - [`time`]: wall-clock abstraction with a controllable mock for tests
//! - [`error`]: error classification shared by every layer

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod time;

pub use error::{ErrorClassification, ErrorSeverity};
pub use time::{Clock, MockClock, SharedClock, SystemClock};
