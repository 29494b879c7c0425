//! Offline queue synchronization
//!
//! - ReconnectWorker: drives health checks and queue replay when the backend
//!   becomes reachable again

pub mod reconnect_worker;

pub use reconnect_worker::{ReconnectWorker, ReconnectWorkerConfig};
