//! # Novem Infrastructure
//!
//! Adapters for the ports defined in `novem-core`, plus the client facade.
//!
//! This crate contains:
//! - The reqwest HTTP transport
//! - Session stores (memory, JSON file, platform keychain)
//! - Connectivity probes (manual, health check polling)
//! - Configuration loading, tracing setup
//! - Background tasks: proactive token refresh, reconnection
//! - [`NovemClient`], which wires all of the above
//!
//! ## Architecture
//! - Implements traits defined in `novem-core`
//! - Contains all "impure" code (network, disk, keychain)

pub mod client;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod http;
pub mod observability;
pub mod scheduling;
pub mod storage;
pub mod sync;

// Re-export commonly used items
pub use client::{NovemClient, NovemClientBuilder};
pub use connectivity::{HealthCheckProbe, ManualProbe};
pub use errors::InfraError;
pub use http::{ReqwestTransport, ReqwestTransportBuilder};
pub use observability::init_tracing;
pub use scheduling::{ProactiveRefreshTask, SchedulerError};
pub use storage::{build_session_store, FileSessionStore, KeychainSessionStore, MemorySessionStore};
pub use sync::{ReconnectWorker, ReconnectWorkerConfig};
