//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Change events table schema.
#[derive(Iden)]
pub enum ChangeEvents {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "project"]
    Project,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "payload"]
    Payload,
}

/// SQL for creating the change events table in SQLite.
pub const SQLITE_CREATE_CHANGE_EVENTS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS change_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project TEXT NOT NULL,
    created_at BIGINT NOT NULL,
    payload TEXT NOT NULL
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_change_events_created_at ON change_events(created_at)",
];

/// SQL for creating the change events table in PostgreSQL.
pub const POSTGRES_CREATE_CHANGE_EVENTS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS change_events (
    id BIGSERIAL PRIMARY KEY,
    project TEXT NOT NULL,
    created_at BIGINT NOT NULL,
    payload TEXT NOT NULL
)
"#,
    "CREATE INDEX IF NOT EXISTS idx_change_events_created_at ON change_events(created_at)",
];

pub const SQLITE_TABLE_EXISTS: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'change_events'";

pub const POSTGRES_TABLE_EXISTS: &str = "SELECT table_name FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_name = 'change_events'";
