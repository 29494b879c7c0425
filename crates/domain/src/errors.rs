//! Error types used throughout the access layer
//!
//! [`ApiError`] is what collaborators see from every request. [`NovemError`]
//! covers the infrastructure around it (configuration, storage).

use std::time::Duration;

use novem_common::{ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Infrastructure error type
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum NovemError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for infrastructure operations
pub type Result<T> = std::result::Result<T, NovemError>;

/// Categories of API errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCategory {
    /// Write accepted locally, will sync later
    Deferred,
    /// Backend not reachable or grace period over
    Connectivity,
    /// Session missing, rejected or expired
    Authentication,
    /// Authenticated but not allowed (403)
    Permission,
    /// Backend failed (5xx)
    Server,
    /// Request rejected by the backend (4xx)
    Client,
    /// Local failure (decode, storage, configuration)
    Internal,
}

/// Errors returned by the request pipeline
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiError {
    /// No attempt was made: refresh is not allowed while offline
    #[error("Offline: backend not reachable, request not attempted")]
    Offline,

    /// Mutating request captured for replay once the backend is reachable
    #[error("Offline: change saved locally and will sync later (operation {operation_id})")]
    OfflineQueued { operation_id: Uuid },

    /// No session at all
    #[error("Authentication required: no active session")]
    AuthRequired,

    /// Refresh was attempted and rejected; the session has been cleared
    #[error("Token refresh failed: {message}")]
    RefreshFailed { message: String },

    /// 401 persisted after one refresh-and-retry
    #[error("Authentication expired: request rejected after token refresh")]
    AuthExpired,

    /// 403
    #[error("Forbidden: {payload}")]
    Forbidden { payload: Value },

    /// 5xx
    #[error("Server error {status}: {payload}")]
    Server { status: u16, payload: Value },

    /// Any other 4xx, carrying the backend payload
    #[error("Validation error {status}: {payload}")]
    Validation { status: u16, payload: Value },

    /// Grace window lapsed; reconnect required before changes are accepted
    #[error("Offline grace period expired: reconnect to continue")]
    GracePeriodExpired,

    /// No response received; reads fall back to cache
    #[error("Backend unreachable: {message}")]
    Unreachable { message: String },

    /// Informational or redirect status that reached the client
    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },

    /// 2xx body did not match the expected shape
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    /// Session store failure
    #[error("Session storage error: {message}")]
    Storage { message: String },

    /// Client misconfiguration
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl ApiError {
    /// Get the error category for this error
    #[must_use]
    pub fn category(&self) -> ApiErrorCategory {
        match self {
            Self::OfflineQueued { .. } => ApiErrorCategory::Deferred,
            Self::Offline | Self::GracePeriodExpired | Self::Unreachable { .. } => {
                ApiErrorCategory::Connectivity
            }
            Self::AuthRequired | Self::RefreshFailed { .. } | Self::AuthExpired => {
                ApiErrorCategory::Authentication
            }
            Self::Forbidden { .. } => ApiErrorCategory::Permission,
            Self::Server { .. } => ApiErrorCategory::Server,
            Self::Validation { .. } | Self::UnexpectedStatus { .. } => ApiErrorCategory::Client,
            Self::Decode { .. } | Self::Storage { .. } | Self::Config { .. } => {
                ApiErrorCategory::Internal
            }
        }
    }

    /// Soft failures do not block the user's workflow: deferred writes and
    /// reads that should fall back to cache.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::OfflineQueued { .. } | Self::Unreachable { .. })
    }

    /// Whether the write was queued for replay.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::OfflineQueued { .. })
    }

    /// Failures caused by the backend being unreachable rather than by the
    /// request itself. 502/503 count as connectivity signals.
    #[must_use]
    pub fn is_connectivity_failure(&self) -> bool {
        match self {
            Self::Offline | Self::GracePeriodExpired | Self::Unreachable { .. } => true,
            Self::Server { status, .. } => is_gateway_status(*status),
            _ => false,
        }
    }

    /// HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Forbidden { .. } => Some(403),
            Self::AuthExpired => Some(401),
            Self::Server { status, .. }
            | Self::Validation { status, .. }
            | Self::UnexpectedStatus { status } => Some(*status),
            _ => None,
        }
    }
}

/// 502 and 503 mean "a proxy could not reach the backend".
#[must_use]
pub fn is_gateway_status(status: u16) -> bool {
    matches!(status, 502 | 503)
}

impl ErrorClassification for ApiError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Offline
                | Self::Unreachable { .. }
                | Self::Server { .. }
                | Self::GracePeriodExpired
        )
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::OfflineQueued { .. } => ErrorSeverity::Info,
            Self::Offline | Self::Unreachable { .. } | Self::Server { .. } => {
                ErrorSeverity::Warning
            }
            Self::Forbidden { .. }
            | Self::Validation { .. }
            | Self::UnexpectedStatus { .. }
            | Self::Decode { .. }
            | Self::Storage { .. }
            | Self::Config { .. } => ErrorSeverity::Error,
            Self::AuthRequired
            | Self::RefreshFailed { .. }
            | Self::AuthExpired
            | Self::GracePeriodExpired => ErrorSeverity::Critical,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Server { .. } => Some(Duration::from_secs(10)),
            Self::Offline | Self::Unreachable { .. } => Some(Duration::from_secs(5)),
            _ => None,
        }
    }
}

impl From<NovemError> for ApiError {
    fn from(err: NovemError) -> Self {
        match err {
            NovemError::Network(message) => Self::Unreachable { message },
            NovemError::Auth(_) => Self::AuthRequired,
            NovemError::Config(message) | NovemError::InvalidInput(message) => {
                Self::Config { message }
            }
            NovemError::Storage(message)
            | NovemError::NotFound(message)
            | NovemError::Internal(message) => Self::Storage { message },
        }
    }
}
