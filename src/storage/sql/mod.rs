//! Change events tables in SQL databases.
//!
//! `SqlRowStore` is written once; the dialect markers below pick the pool,
//! the DDL and the query builder for the primary (PostgreSQL or SQLite) and
//! the fallback file (always SQLite).

mod query;
mod row_store;

pub use query::SqlDatabase;
pub use row_store::SqlRowStore;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL dialect, used for a remote primary store.

    use sea_query::PostgresQueryBuilder;
    use sqlx::PgPool;

    use crate::storage::schema;

    /// Selects `PgPool`, BIGSERIAL ids and the PostgreSQL builder.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;

        const CREATE_TABLE: &'static [&'static str] = schema::POSTGRES_CREATE_CHANGE_EVENTS;
        const TABLE_EXISTS: &'static str = schema::POSTGRES_TABLE_EXISTS;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(PostgresQueryBuilder)
        }
    }

    /// Change events in a PostgreSQL database.
    pub type PostgresRowStore = super::SqlRowStore<Postgres>;
}

pub mod sqlite {
    //! SQLite dialect, used for the fallback file and file-based primaries.

    use sea_query::SqliteQueryBuilder;
    use sqlx::SqlitePool;

    use crate::storage::schema;

    /// Selects `SqlitePool`, AUTOINCREMENT ids and the SQLite builder.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;

        const CREATE_TABLE: &'static [&'static str] = schema::SQLITE_CREATE_CHANGE_EVENTS;
        const TABLE_EXISTS: &'static str = schema::SQLITE_TABLE_EXISTS;

        fn build_select(stmt: sea_query::SelectStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_insert(stmt: sea_query::InsertStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }

        fn build_delete(stmt: sea_query::DeleteStatement) -> String {
            stmt.to_string(SqliteQueryBuilder)
        }
    }

    /// Change events in a SQLite database.
    pub type SqliteRowStore = super::SqlRowStore<Sqlite>;
}
