//! Eventslog - durable project event log
//!
//! Records project lifecycle events in a primary relational store. When the
//! primary is unreachable, events are written to a local SQLite fallback and
//! copied back into the primary once connectivity returns.

pub mod config;
pub mod event;
pub mod interfaces;
pub mod query;
pub mod services;
pub mod storage;
pub mod store;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use event::{EventEntry, ProjectEvent, ProjectEvents};
pub use interfaces::{
    AccessError, EventFilter, Principal, ProjectAccess, QueryMaker, RowStore, StorageError,
    Visibility,
};
pub use store::{FailoverEventStore, FailoverSettings, Mode};
