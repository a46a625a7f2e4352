//! Tracing subscriber setup.

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive, e.g. `memsync_coordinator=debug`.
pub const ENV_LOG: &str = "MEMSYNC_LOG";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Build the filter from `MEMSYNC_LOG` when set, otherwise from `config.level`.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let directive = std::env::var(ENV_LOG).unwrap_or_else(|_| config.level.clone());
    EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidFilter {
        directive,
        reason: e.to_string(),
    })
}

/// Install a global fmt subscriber.
///
/// Returns an error instead of panicking when a global subscriber is already
/// set, so embedding applications can call this unconditionally.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.compact {
        builder.compact().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| LoggingError::Install(e.to_string()))
}
