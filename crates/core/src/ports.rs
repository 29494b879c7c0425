//! Port interfaces for the access layer

use async_trait::async_trait;
use novem_domain::{HttpRequest, HttpResponse, Result};
use thiserror::Error;
use tokio::sync::watch;

/// Key/value persistence for session slots and the offline queue.
///
/// Values are opaque strings. Adapters must be safe to call concurrently.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a slot; `None` when absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a slot, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a slot; removing an absent slot is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// Write several slots as a set.
    ///
    /// The default writes one slot at a time; adapters that can write
    /// atomically should override it.
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Remove several slots as a set
    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Network reachability as reported by the platform.
pub trait ConnectivityProbe: Send + Sync {
    /// Current reachability
    fn is_reachable(&self) -> bool;

    /// Receiver notified on every reachability change
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Failure to obtain any HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Timeout, refused connection, DNS failure and the like
    #[error("no response received: {0}")]
    NoResponse(String),

    /// The request could not be built (bad base URL, unencodable body)
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// One HTTP exchange against the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request. Every status code is an `Ok` response; only the
    /// absence of a response is an error.
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}
