//! Unified SQL RowStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::sqlite::Sqlite;
use super::SqlDatabase;
use crate::interfaces::{Result, StorageError};
use crate::utils::retry::is_transient_error;

/// SQL-based implementation of RowStore.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlRowStore<DB: SqlDatabase> {
    pool: DB::Pool,
    /// Backing file, for file-based SQLite databases.
    path: Option<PathBuf>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlRowStore<DB> {
    /// Create a new SQL row store with the given pool.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            path: None,
            _marker: PhantomData,
        }
    }

    /// Create a row store over a database that lives in `path`.
    pub fn with_file(pool: DB::Pool, path: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            path: Some(path.into()),
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// A rejected select is the filter's fault unless the database went away.
fn reject_as_malformed(err: sqlx::Error) -> StorageError {
    if is_transient_error(&err) {
        return StorageError::Connectivity(err);
    }
    match err {
        sqlx::Error::Database(db) => StorageError::MalformedQuery(db.message().to_string()),
        other => StorageError::Database(other),
    }
}

impl SqlRowStore<Sqlite> {
    async fn table_exists(&self) -> Result<bool> {
        // Connecting would create the file.
        if let Some(path) = &self.path {
            if !tokio::fs::try_exists(path).await? {
                return Ok(false);
            }
        }
        let row = sqlx::query(Sqlite::TABLE_EXISTS)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn write_snapshot(&self) -> Result<Option<PathBuf>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let target = dir.join(format!("change_events{}.db", Utc::now().timestamp()));
        let quoted = target.to_string_lossy().replace('\'', "''");

        sqlx::query(&format!("VACUUM INTO '{quoted}'"))
            .execute(&self.pool)
            .await?;

        Ok(Some(target))
    }
}

#[cfg(feature = "postgres")]
impl SqlRowStore<super::postgres::Postgres> {
    async fn table_exists(&self) -> Result<bool> {
        use super::postgres::Postgres;

        let row = sqlx::query(Postgres::TABLE_EXISTS)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn write_snapshot(&self) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Macro to implement RowStore for a specific SQL backend.
///
/// Backend-specific behavior (catalog lookup, file snapshots) lives in the
/// inherent `table_exists` and `write_snapshot` methods of each backend.
macro_rules! impl_row_store {
    ($db_type:ty, $row_type:ty) => {
        impl SqlRowStore<$db_type> {
            fn entries(rows: Vec<$row_type>) -> Result<Vec<crate::event::EventEntry>> {
                use sqlx::Row;

                rows.iter()
                    .map(|row| -> Result<crate::event::EventEntry> {
                        let created_at: i64 = row.try_get("created_at")?;
                        Ok(crate::event::EventEntry {
                            id: row.try_get("id")?,
                            project: row.try_get("project")?,
                            timestamp: chrono::DateTime::from_timestamp(created_at, 0)
                                .unwrap_or_default(),
                            payload: row.try_get("payload")?,
                        })
                    })
                    .collect()
            }
        }

        #[async_trait::async_trait]
        impl crate::interfaces::RowStore for SqlRowStore<$db_type> {
            async fn ensure_schema(&self) -> Result<()> {
                for statement in <$db_type as SqlDatabase>::CREATE_TABLE {
                    sqlx::query(statement).execute(&self.pool).await?;
                }
                Ok(())
            }

            async fn insert(
                &self,
                project: &str,
                timestamp: chrono::DateTime<Utc>,
                payload: &str,
            ) -> Result<()> {
                use sea_query::Query;

                use crate::storage::schema::ChangeEvents;

                let stmt = Query::insert()
                    .into_table(ChangeEvents::Table)
                    .columns([
                        ChangeEvents::Project,
                        ChangeEvents::CreatedAt,
                        ChangeEvents::Payload,
                    ])
                    .values_panic([
                        project.into(),
                        timestamp.timestamp().into(),
                        payload.into(),
                    ])
                    .to_owned();

                let sql = <$db_type>::build_insert(stmt);
                sqlx::query(&sql).execute(&self.pool).await?;

                Ok(())
            }

            async fn query(
                &self,
                filter: &crate::interfaces::EventFilter,
            ) -> Result<crate::event::ProjectEvents> {
                use sea_query::{Expr, Order, Query};

                use crate::storage::schema::ChangeEvents;

                filter.validate()?;

                // Statements are not Send; render before awaiting.
                let sql = {
                    let mut stmt = Query::select();
                    stmt.columns([
                        ChangeEvents::Id,
                        ChangeEvents::Project,
                        ChangeEvents::CreatedAt,
                        ChangeEvents::Payload,
                    ])
                    .from(ChangeEvents::Table)
                    .order_by(ChangeEvents::Id, Order::Asc);
                    if let Some(from) = filter.from {
                        stmt.and_where(Expr::col(ChangeEvents::CreatedAt).gte(from.timestamp()));
                    }
                    if let Some(to) = filter.to {
                        stmt.and_where(Expr::col(ChangeEvents::CreatedAt).lte(to.timestamp()));
                    }
                    if let Some(limit) = filter.limit {
                        stmt.limit(limit);
                    }
                    <$db_type>::build_select(stmt)
                };
                let rows = sqlx::query(&sql)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(reject_as_malformed)?;

                let mut grouped = crate::event::ProjectEvents::new();
                for entry in Self::entries(rows)? {
                    grouped.entry(entry.project.clone()).or_default().push(entry);
                }
                Ok(grouped)
            }

            async fn query_all(&self) -> Result<Vec<crate::event::EventEntry>> {
                use sea_query::{Order, Query};

                use crate::storage::schema::ChangeEvents;

                let stmt = Query::select()
                    .columns([
                        ChangeEvents::Id,
                        ChangeEvents::Project,
                        ChangeEvents::CreatedAt,
                        ChangeEvents::Payload,
                    ])
                    .from(ChangeEvents::Table)
                    .order_by(ChangeEvents::Id, Order::Asc)
                    .to_owned();

                let sql = <$db_type>::build_select(stmt);
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

                Self::entries(rows)
            }

            async fn delete_older_than(&self, max_age_days: u32) -> Result<u64> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::ChangeEvents;

                let sql = {
                    let mut stmt = Query::delete();
                    stmt.from_table(ChangeEvents::Table);
                    if max_age_days > 0 {
                        let cutoff = Utc::now() - chrono::Duration::days(i64::from(max_age_days));
                        stmt.and_where(Expr::col(ChangeEvents::CreatedAt).lt(cutoff.timestamp()));
                    }
                    <$db_type>::build_delete(stmt)
                };
                let result = sqlx::query(&sql).execute(&self.pool).await?;

                Ok(result.rows_affected())
            }

            async fn delete_project(&self, project: &str) -> Result<u64> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::ChangeEvents;

                let stmt = Query::delete()
                    .from_table(ChangeEvents::Table)
                    .and_where(Expr::col(ChangeEvents::Project).eq(project))
                    .to_owned();

                let sql = <$db_type>::build_delete(stmt);
                let result = sqlx::query(&sql).execute(&self.pool).await?;

                Ok(result.rows_affected())
            }

            async fn probe(&self) -> Result<()> {
                sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
                Ok(())
            }

            async fn exists(&self) -> Result<bool> {
                self.table_exists().await
            }

            async fn snapshot(&self) -> Result<Option<PathBuf>> {
                self.write_snapshot().await
            }

            async fn close(&self) {
                self.pool.close().await;
            }
        }
    };
}

// Generate implementations for each SQL backend
#[cfg(feature = "postgres")]
impl_row_store!(super::postgres::Postgres, sqlx::postgres::PgRow);
impl_row_store!(super::sqlite::Sqlite, sqlx::sqlite::SqliteRow);
