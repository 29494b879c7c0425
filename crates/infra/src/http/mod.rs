//! HTTP transport adapter

pub mod transport;

pub use transport::{ReqwestTransport, ReqwestTransportBuilder};
