//! Domain types
//!
//! Plain data shared by every layer. No I/O lives here.

pub mod auth;
pub mod connectivity;
pub mod http;
pub mod queue;

pub use auth::*;
pub use connectivity::*;
pub use http::*;
pub use queue::*;
