//! Logging bootstrap for binaries and tests embedding the engine

use crate::config::LoggingConfig;
use crate::error::{GraphError, Result};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` when set, otherwise the configured level
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(&config.level),
    }
    .map_err(|e| GraphError::Configuration(format!("Invalid log filter: {}", e)))
}

/// Install a global `fmt` subscriber.
///
/// Fails instead of panicking when a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_target(config.with_target)
        .compact()
        .try_init()
        .map_err(|e| GraphError::Configuration(format!("Logging already initialized: {}", e)))
}
