//! Logging setup
//!
//! Installs a layered `tracing` subscriber:
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else configured level)
//!   └── Fmt Layer (stderr, text or JSON)
//! ```
//!
//! Logs go to stderr so stdout stays reserved for command output.

use crate::config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Errors that can occur during logging initialization
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Build the filter: `RUST_LOG` wins, then `level_override`, then the config
pub fn build_filter(
    config: &LoggingConfig,
    level_override: Option<&str>,
) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = level_override.unwrap_or(&config.level);
    EnvFilter::try_new(directive)
        .map_err(|e| LoggingError::InvalidFilter(directive.to_string(), e.to_string()))
}

/// Initialize the global subscriber
pub fn init(config: &LoggingConfig, level_override: Option<&str>) -> Result<(), LoggingError> {
    let env_filter = build_filter(config, level_override)?;

    let result = if config.format == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        let subscriber = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
