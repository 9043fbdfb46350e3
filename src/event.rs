//! Event record types.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;

/// Records grouped by project name.
///
/// Each group is in ascending `id` order as read from one physical table.
pub type ProjectEvents = BTreeMap<String, Vec<EventEntry>>;

/// One row of the change events table.
///
/// `id` is assigned by the table and only meaningful within it: it restores
/// insertion order when results are regrouped, and nothing else.
#[derive(Debug, Clone)]
pub struct EventEntry {
    pub id: i64,
    pub project: String,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

/// An event about to be stored.
#[derive(Debug, Clone)]
pub struct ProjectEvent {
    /// Project the event belongs to. Events without one are not stored.
    pub project: Option<String>,
    /// When the event happened. Defaults to the time of insertion.
    pub created_on: Option<DateTime<Utc>>,
    /// Serialized event, stored verbatim.
    pub payload: String,
}

impl ProjectEvent {
    pub fn new(project: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            created_on: None,
            payload: payload.into(),
        }
    }

    /// Serialize `event` to JSON and wrap it for storage.
    pub fn from_event<T: Serialize>(
        project: Option<&str>,
        event: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            project: project.map(str::to_string),
            created_on: None,
            payload: serde_json::to_string(event)?,
        })
    }

    pub fn with_created_on(mut self, created_on: DateTime<Utc>) -> Self {
        self.created_on = Some(created_on);
        self
    }

    /// The project name, if it is present and not blank.
    pub fn project_name(&self) -> Option<&str> {
        self.project
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Event time at the resolution the store keeps (whole seconds).
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.created_on.unwrap_or_else(Utc::now).trunc_subsecs(0)
    }
}
