//! Configuration types.
//!
//! Loaded from YAML files and `EVENTSLOG__`-prefixed environment variables.

mod storage;

use std::time::Duration;

use serde::Deserialize;

pub use storage::{Driver, StorageConfig, DEFAULT_LOCAL_PATH, FALLBACK_FILE_NAME};

use crate::store::FailoverSettings;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "eventslog.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EVENTSLOG_CONFIG";
/// Environment variable prefix for configuration overrides.
pub const CONFIG_ENV_PREFIX: &str = "EVENTSLOG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Unsupported database driver: {0}")]
    UnsupportedDriver(String),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub failover: FailoverConfig,
    pub retention: RetentionConfig,
    pub query: QueryConfig,
}

/// Write retry and reconnection timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Attempts per write before switching to the fallback.
    pub max_tries: u32,
    /// Pause between write attempts, in milliseconds.
    pub retry_timeout_ms: u64,
    /// Pool acquire timeout and reconnection probe interval, in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_tries: 3,
            retry_timeout_ms: 1000,
            connect_timeout_ms: 1000,
        }
    }
}

impl FailoverConfig {
    pub fn max_tries(&self) -> u32 {
        self.max_tries.max(1)
    }

    pub fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Primary rows older than this many days are swept nightly.
    pub max_age_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { max_age_days: 30 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Row cap applied to every query.
    pub return_limit: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { return_limit: 5000 }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `eventslog.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.storage.driver()?;
        Ok(config)
    }

    /// Store settings derived from the failover and retention sections.
    pub fn failover_settings(&self) -> FailoverSettings {
        FailoverSettings {
            max_tries: self.failover.max_tries(),
            wait_time: self.failover.retry_timeout(),
            connect_time: self.failover.connect_timeout(),
            max_age_days: self.retention.max_age_days,
            copy_local: self.storage.copy_local,
        }
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
