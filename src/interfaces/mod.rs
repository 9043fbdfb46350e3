//! Abstract interfaces for eventslog components.
//!
//! These traits define the contracts for:
//! - Row storage (one physical change events table)
//! - Project access checks (query result filtering)
//! - Query building (request parameters to filters)

pub mod access;
pub mod query;
pub mod row_store;

pub use access::{AccessError, Principal, ProjectAccess, Visibility};
pub use query::{EventFilter, QueryMaker};
pub use row_store::{Result, RowStore, StorageError};
