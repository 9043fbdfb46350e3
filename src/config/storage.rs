//! Storage configuration types.

use std::path::PathBuf;

use serde::Deserialize;

use super::ConfigError;

/// Default fallback directory.
pub const DEFAULT_LOCAL_PATH: &str = "events-db";

/// File name of the fallback database inside `local_path`.
pub const FALLBACK_FILE_NAME: &str = "change_events.db";

/// Database driver, derived from the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Sqlite,
    Postgres,
}

/// Primary and fallback storage configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Primary database URL (`sqlite:...` or `postgres://...`).
    pub url: String,
    /// Extra connection parameters appended to the URL query string.
    pub url_options: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Pool size for the primary store.
    pub max_connections: u32,
    /// Directory holding the fallback SQLite file.
    pub local_path: PathBuf,
    /// Snapshot the fallback file before clearing it after a restore.
    pub copy_local: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:events.db".to_string(),
            url_options: Vec::new(),
            username: None,
            password: None,
            max_connections: 8,
            local_path: PathBuf::from(DEFAULT_LOCAL_PATH),
            copy_local: false,
        }
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("url", &self.url)
            .field("url_options", &self.url_options)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("max_connections", &self.max_connections)
            .field("local_path", &self.local_path)
            .field("copy_local", &self.copy_local)
            .finish()
    }
}

impl StorageConfig {
    pub fn driver(&self) -> Result<Driver, ConfigError> {
        let (scheme, _) = self
            .url
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidUrl(self.url.clone()))?;
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Driver::Sqlite),
            "postgres" | "postgresql" => Ok(Driver::Postgres),
            other => Err(ConfigError::UnsupportedDriver(other.to_string())),
        }
    }

    /// The primary URL with `url_options` appended as query parameters.
    pub fn connection_url(&self) -> String {
        if self.url_options.is_empty() {
            return self.url.clone();
        }
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, self.url_options.join("&"))
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections.max(1)
    }

    pub fn fallback_file(&self) -> PathBuf {
        self.local_path.join(FALLBACK_FILE_NAME)
    }
}
