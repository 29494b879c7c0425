//! Background task scheduling
//!
//! - Proactive token refresh ticker, started with a session and stopped on
//!   every teardown
//!
//! Tasks follow the same lifecycle rules:
//! - Explicit start/stop
//! - Join handles for spawned tasks
//! - Cancellation token support

pub mod error;
pub mod proactive_refresh;

pub use error::{SchedulerError, SchedulerResult};
pub use proactive_refresh::ProactiveRefreshTask;
