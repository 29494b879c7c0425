//! Error classification shared across Novem crates
//!
//! Every layer defines its own `thiserror` enum; this module only provides
//! the common vocabulary used for retry decisions and log levels.
//!
//! | Level | Use Case | Examples |
//! |-------|----------|----------|
//! | **Info** | Expected conditions | write deferred while offline |
//! | **Warning** | Degraded but operational | backend unreachable, 5xx |
//! | **Error** | Failure requiring attention | validation, forbidden |
//! | **Critical** | User must act | session lost, grace period expired |

use std::fmt;
use std::time::Duration;

/// Standard interface for classifying errors by their characteristics.
pub trait ErrorClassification {
    /// Whether the same operation may succeed if attempted again later.
    fn is_retryable(&self) -> bool;

    /// Severity used for monitoring and log level decisions.
    fn severity(&self) -> ErrorSeverity;

    /// Whether this error requires immediate user attention.
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Suggested delay before retrying, if one applies.
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
