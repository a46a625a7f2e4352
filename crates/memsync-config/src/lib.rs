//! Configuration and logging setup for memsync.

pub mod config;
pub mod logging;

pub use config::{default_config_path, AppConfig, ConfigError, LoggingConfig, SyncConfig};
pub use logging::{init_logging, LoggingError};
