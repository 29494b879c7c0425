//! # Novem Domain
//!
//! Data types shared by every layer of the access layer.
//!
//! This crate contains:
//! - Session types (access/refresh tokens, identity, logout reasons)
//! - Connectivity state and queued operations
//! - Backend wire DTOs
//! - Error taxonomy and Result definitions
//! - Configuration structures
//!
//! ## Architecture
//! - Depends only on `novem-common` and serde-level external crates
//! - No I/O, no async

pub mod config;
pub mod constants;
pub mod errors;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
