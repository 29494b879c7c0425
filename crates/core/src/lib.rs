//! # Novem Core
//!
//! Business logic of the access layer, free of any I/O implementation.
//!
//! This crate contains:
//! - Port interfaces (session store, connectivity probe, transport)
//! - Token lifecycle management with single-flight refresh
//! - The connectivity / grace-period state machine
//! - The offline operation queue
//! - The request pipeline every call goes through
//!
//! ## Architecture Principles
//! - Depends only on `novem-common` and `novem-domain`
//! - No HTTP, filesystem or keychain code
//! - All external dependencies via traits

pub mod auth;
pub mod connectivity;
pub mod pipeline;
pub mod ports;
pub mod queue;

pub use auth::events::{LogoutNotifier, SubscriptionId};
pub use auth::token_manager::TokenLifecycleManager;
pub use connectivity::ConnectivityMachine;
pub use pipeline::RequestPipeline;
pub use ports::{ConnectivityProbe, SessionStore, Transport, TransportError};
pub use queue::{OperationQueue, QueueError, ReplayOutcome, ReplayReport, ReplayTarget};
