//! Connectivity probe adapters

mod health_check;
mod manual;

pub use health_check::HealthCheckProbe;
pub use manual::ManualProbe;
