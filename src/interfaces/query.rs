//! Query filter interface.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::row_store::{Result, StorageError};
use crate::event::EventEntry;

/// Selection over the change events table.
///
/// Bounds are inclusive. `limit` caps the number of rows returned, oldest
/// first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
}

impl EventFilter {
    /// Every row, uncapped.
    pub fn all() -> Self {
        Self::default()
    }

    /// Rows between two instants, given in either order.
    pub fn between(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        Self {
            from: Some(from),
            to: Some(to),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(StorageError::MalformedQuery(format!(
                    "lower bound {from} is after upper bound {to}"
                )));
            }
        }
        Ok(())
    }

    /// Whether `entry` falls inside the bounds. Ignores `limit`.
    pub fn matches(&self, entry: &EventEntry) -> bool {
        self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp <= to)
    }
}

/// Translates request parameters into an `EventFilter`.
pub trait QueryMaker: Send + Sync {
    /// Build a filter from request parameters.
    ///
    /// `None` yields the default filter. Parameters that cannot be parsed
    /// fail with `MalformedQuery`.
    fn form_query(&self, params: Option<&HashMap<String, String>>) -> Result<EventFilter>;

    /// Filter used when the request carries no parameters.
    fn default_query(&self) -> EventFilter;
}
