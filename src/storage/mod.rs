//! Storage implementations.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::config::{Config, Driver, StorageConfig};
use crate::interfaces::RowStore;

pub mod schema;
pub mod sql;

pub use sql::sqlite::SqliteRowStore;
pub use sql::{SqlDatabase, SqlRowStore};

#[cfg(feature = "postgres")]
pub use sql::postgres::PostgresRowStore;

/// The two row stores a failover store writes to.
pub struct StorageClients {
    pub primary: Arc<dyn RowStore>,
    pub fallback: Arc<dyn RowStore>,
}

/// Initialize storage based on configuration.
///
/// Pools connect lazily, so an unreachable primary is reported on first use
/// rather than here.
pub async fn init_storage(
    config: &Config,
) -> Result<StorageClients, Box<dyn std::error::Error + Send + Sync>> {
    let storage = &config.storage;
    let connect_timeout = config.failover.connect_timeout();
    let driver = storage.driver()?;

    info!(
        ?driver,
        local_path = %storage.local_path.display(),
        max_connections = storage.max_connections(),
        "Initializing storage"
    );

    let primary: Arc<dyn RowStore> = match driver {
        Driver::Sqlite => Arc::new(sqlite_primary(storage, connect_timeout)?),
        #[cfg(feature = "postgres")]
        Driver::Postgres => Arc::new(postgres_primary(storage, connect_timeout)?),
        #[cfg(not(feature = "postgres"))]
        Driver::Postgres => {
            tracing::error!("PostgreSQL storage requested but 'postgres' feature is not enabled");
            return Err("PostgreSQL feature not enabled".into());
        }
    };

    tokio::fs::create_dir_all(&storage.local_path).await?;
    let fallback: Arc<dyn RowStore> =
        Arc::new(open_sqlite_file(&storage.fallback_file(), 1, connect_timeout));

    Ok(StorageClients { primary, fallback })
}

/// Row store over a SQLite file, created on first connection.
pub fn open_sqlite_file(path: &Path, max_connections: u32, acquire_timeout: Duration) -> SqliteRowStore {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(acquire_timeout)
        .connect_lazy_with(options);
    SqliteRowStore::with_file(pool, path)
}

fn sqlite_primary(
    storage: &StorageConfig,
    acquire_timeout: Duration,
) -> Result<SqliteRowStore, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&storage.connection_url())?.create_if_missing(true);
    let file = options.get_filename().to_path_buf();
    let in_memory = file.as_os_str() == ":memory:";

    let pool = SqlitePoolOptions::new()
        .max_connections(storage.max_connections())
        .acquire_timeout(acquire_timeout)
        .connect_lazy_with(options);

    Ok(if in_memory {
        SqliteRowStore::new(pool)
    } else {
        SqliteRowStore::with_file(pool, file)
    })
}

#[cfg(feature = "postgres")]
fn postgres_primary(
    storage: &StorageConfig,
    acquire_timeout: Duration,
) -> Result<PostgresRowStore, sqlx::Error> {
    use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

    let mut options = PgConnectOptions::from_str(&storage.connection_url())?;
    if let Some(username) = &storage.username {
        options = options.username(username);
    }
    if let Some(password) = &storage.password {
        options = options.password(password);
    }

    let pool = PgPoolOptions::new()
        .max_connections(storage.max_connections())
        .acquire_timeout(acquire_timeout)
        .connect_lazy_with(options);

    Ok(PostgresRowStore::new(pool))
}
