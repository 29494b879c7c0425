//! Tracing subscriber setup
//!
//! `RUST_LOG` takes precedence over the configured level so operators can
//! raise verbosity for one module without touching the config file.

use novem_domain::{LoggingConfig, NovemError, Result};
use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber.
///
/// # Errors
/// Returns `NovemError::Config` if the configured level is not a valid filter
/// directive, or `NovemError::Internal` if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| NovemError::Internal(format!("tracing already initialised: {e}")))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            NovemError::Config(format!("Invalid log level '{}': {}", config.level, e))
        }),
    }
}
