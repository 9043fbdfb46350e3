//! Row storage interface.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::query::EventFilter;
use crate::event::{EventEntry, ProjectEvents};
use crate::utils::retry::is_transient_error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The database could not be reached. Writes retry on this.
    #[error("Connection error: {0}")]
    Connectivity(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// The primary store is offline; queries are not served from the fallback.
    #[error("Service unavailable: events are being stored locally")]
    ServiceUnavailable,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Whether the failure is likely temporary and worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Connectivity(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if is_transient_error(&err) {
            StorageError::Connectivity(err)
        } else {
            StorageError::Database(err)
        }
    }
}

/// Interface to one physical change events table.
///
/// Every call acquires a pooled connection and releases it before
/// returning, on success and on failure.
///
/// Implementations:
/// - `SqliteRowStore`: SQLite storage (fallback, or primary in small setups)
/// - `PostgresRowStore`: PostgreSQL storage
/// - `MockRowStore`: In-memory mock for testing
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Create the change events table if it does not exist.
    async fn ensure_schema(&self) -> Result<()>;

    /// Append one row.
    async fn insert(&self, project: &str, timestamp: DateTime<Utc>, payload: &str) -> Result<()>;

    /// Rows matching `filter`, grouped by project.
    ///
    /// Fails with `MalformedQuery` if the filter is invalid or rejected by
    /// the database.
    async fn query(&self, filter: &EventFilter) -> Result<ProjectEvents>;

    /// Every row in ascending `id` order.
    async fn query_all(&self) -> Result<Vec<EventEntry>>;

    /// Delete rows older than `max_age_days`. Zero deletes every row.
    async fn delete_older_than(&self, max_age_days: u32) -> Result<u64>;

    /// Delete every row of `project`.
    async fn delete_project(&self, project: &str) -> Result<u64>;

    /// Minimal read used to decide whether the database is reachable.
    async fn probe(&self) -> Result<()>;

    /// Whether the backing table has ever been created.
    async fn exists(&self) -> Result<bool>;

    /// Copy the backing database aside, returning where the copy was written.
    ///
    /// Backends that cannot be copied return `None`.
    async fn snapshot(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    /// Release pooled connections. Safe to call more than once.
    async fn close(&self);
}
