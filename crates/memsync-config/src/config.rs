//! Configuration for the dual-store synchronization coordinator.
//!
//! Configuration is read from a TOML file with two tables:
//!
//! ```toml
//! [sync]
//! single_store_mode = false
//! max_retries = 3
//! retry_backoff_secs = 1.0
//!
//! [logging]
//! level = "info"
//! compact = false
//! ```
//!
//! Every field is optional and falls back to its default. A handful of
//! `MEMSYNC_*` environment variables can override the file afterwards.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Environment variable that forces single-store mode on or off.
pub const ENV_SINGLE_STORE_MODE: &str = "MEMSYNC_SINGLE_STORE_MODE";
/// Environment variable that overrides the per-call attempt budget.
pub const ENV_MAX_RETRIES: &str = "MEMSYNC_MAX_RETRIES";
/// Environment variable that overrides the initial retry backoff in seconds.
pub const ENV_RETRY_BACKOFF_SECS: &str = "MEMSYNC_RETRY_BACKOFF_SECS";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings that govern how the coordinator talks to both stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Skip the graph store entirely, even when one is supplied
    pub single_store_mode: bool,
    /// Maximum number of attempts per store call
    pub max_retries: u32,
    /// Delay before the first retry; doubled on every further attempt
    pub retry_backoff_secs: f64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            single_store_mode: false,
            max_retries: 3,
            retry_backoff_secs: 1.0,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "sync.max_retries must be at least 1".to_string(),
            ));
        }
        if !self.retry_backoff_secs.is_finite() || self.retry_backoff_secs < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "sync.retry_backoff_secs must be a non-negative number, got {}",
                self.retry_backoff_secs
            )));
        }
        Ok(())
    }
}

/// Logging settings consumed by [`crate::logging::init_logging`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `MEMSYNC_LOG` is not set
    pub level: String,
    /// Use the compact single-line formatter
    pub compact: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            compact: false,
        }
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded memsync config from {}", path.display());
        Self::from_toml_str(&raw)
    }

    /// Load the per-user config file if it exists, otherwise use defaults.
    /// Environment overrides are applied in both cases.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let mut config = match default_config_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `MEMSYNC_*` environment overrides on top of the current values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_value::<bool>(ENV_SINGLE_STORE_MODE)? {
            self.sync.single_store_mode = value;
        }
        if let Some(value) = env_value::<u32>(ENV_MAX_RETRIES)? {
            self.sync.max_retries = value;
        }
        if let Some(value) = env_value::<f64>(ENV_RETRY_BACKOFF_SECS)? {
            self.sync.retry_backoff_secs = value;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Location of the per-user config file, e.g. `~/.config/memsync/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "memsync").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        std::env::remove_var(ENV_SINGLE_STORE_MODE);
        std::env::remove_var(ENV_MAX_RETRIES);
        std::env::remove_var(ENV_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert!(!config.sync.single_store_mode);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.retry_backoff_secs, 1.0);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [sync]
            single_store_mode = true
            "#,
        )
        .expect("config");

        assert!(config.sync.single_store_mode);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn rejects_zero_retries() {
        let result = AppConfig::from_toml_str("[sync]\nmax_retries = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_negative_backoff() {
        let result = AppConfig::from_toml_str("[sync]\nretry_backoff_secs = -0.5\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_malformed_toml() {
        let result = AppConfig::from_toml_str("[sync\nmax_retries = 2");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "[sync]\nmax_retries = 5\nretry_backoff_secs = 0.25\n\n[logging]\nlevel = \"debug\"\ncompact = true"
        )
        .expect("write");

        let config = AppConfig::load(file.path()).expect("config");
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.retry_backoff_secs, 0.25);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.compact);
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.toml");

        match AppConfig::load(&path) {
            Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected read error, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn env_overrides_take_precedence() {
        clear_env();
        std::env::set_var(ENV_SINGLE_STORE_MODE, "true");
        std::env::set_var(ENV_MAX_RETRIES, "7");
        std::env::set_var(ENV_RETRY_BACKOFF_SECS, "0.1");

        let mut config = AppConfig::default();
        let result = config.apply_env_overrides();
        clear_env();

        result.expect("overrides");
        assert!(config.sync.single_store_mode);
        assert_eq!(config.sync.max_retries, 7);
        assert_eq!(config.sync.retry_backoff_secs, 0.1);
    }

    #[test]
    #[serial]
    fn invalid_env_value_is_an_error() {
        clear_env();
        std::env::set_var(ENV_MAX_RETRIES, "lots");

        let mut config = AppConfig::default();
        let result = config.apply_env_overrides();
        clear_env();

        match result {
            Err(ConfigError::InvalidEnv { key, value }) => {
                assert_eq!(key, ENV_MAX_RETRIES);
                assert_eq!(value, "lots");
            }
            other => panic!("expected env error, got {:?}", other),
        }
    }
}
