//! Test utilities and mock implementations.
//!
//! This module provides mock implementations of core traits for testing
//! without requiring an actual database.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::event::{EventEntry, ProjectEvents};
use crate::interfaces::{
    AccessError, EventFilter, Principal, ProjectAccess, Result, RowStore, StorageError,
    Visibility,
};

fn unreachable_error() -> StorageError {
    StorageError::Connectivity(sqlx::Error::PoolTimedOut)
}

/// Mock row store that keeps rows in memory.
///
/// Failures can be injected: a full outage, connectivity failures for the
/// next N calls, or rejected inserts for chosen projects.
#[derive(Default)]
pub struct MockRowStore {
    rows: RwLock<Vec<EventEntry>>,
    next_id: AtomicI64,
    created: AtomicBool,
    closed: AtomicBool,
    outage: AtomicBool,
    fail_next: AtomicU32,
    rejected_projects: RwLock<HashSet<String>>,
    insert_attempts: AtomicUsize,
    probes: AtomicUsize,
    snapshots: AtomicUsize,
    insert_delay_ms: AtomicU64,
    read_delay_ms: AtomicU64,
}

impl MockRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a connectivity error until cleared.
    pub fn set_outage(&self, outage: bool) {
        self.outage.store(outage, Ordering::SeqCst);
    }

    /// Fail the next `count` calls with a connectivity error.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Hold each insert for `delay` before its row is written.
    pub fn set_insert_delay(&self, delay: Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Hold each `query_all` for `delay` after taking its snapshot of the rows.
    pub fn set_read_delay(&self, delay: Duration) {
        self.read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn pause(delay_ms: &AtomicU64) {
        let ms = delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Reject inserts for `project` with a non-transient error.
    pub async fn reject_project(&self, project: &str) {
        self.rejected_projects
            .write()
            .await
            .insert(project.to_string());
    }

    /// All rows in insertion order.
    pub async fn rows(&self) -> Vec<EventEntry> {
        self.rows.read().await.clone()
    }

    pub async fn payloads(&self) -> Vec<String> {
        self.rows
            .read()
            .await
            .iter()
            .map(|entry| entry.payload.clone())
            .collect()
    }

    pub fn insert_attempts(&self) -> usize {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.outage.load(Ordering::SeqCst) {
            return Err(unreachable_error());
        }
        let failed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(unreachable_error());
        }
        Ok(())
    }
}

#[async_trait]
impl RowStore for MockRowStore {
    async fn ensure_schema(&self) -> Result<()> {
        self.check_available()?;
        self.created.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn insert(&self, project: &str, timestamp: DateTime<Utc>, payload: &str) -> Result<()> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.rejected_projects.read().await.contains(project) {
            return Err(StorageError::Database(sqlx::Error::Protocol(format!(
                "insert rejected for {project}"
            ))));
        }

        Self::pause(&self.insert_delay_ms).await;
        self.created.store(true, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.rows.write().await.push(EventEntry {
            id,
            project: project.to_string(),
            timestamp,
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn query(&self, filter: &EventFilter) -> Result<ProjectEvents> {
        self.check_available()?;
        filter.validate()?;

        let rows = self.rows.read().await;
        let limit = filter.limit.map_or(usize::MAX, |n| n as usize);
        let mut grouped = ProjectEvents::new();
        for entry in rows.iter().filter(|e| filter.matches(e)).take(limit) {
            grouped
                .entry(entry.project.clone())
                .or_default()
                .push(entry.clone());
        }
        Ok(grouped)
    }

    async fn query_all(&self) -> Result<Vec<EventEntry>> {
        self.check_available()?;
        let rows = self.rows.read().await.clone();
        Self::pause(&self.read_delay_ms).await;
        Ok(rows)
    }

    async fn delete_older_than(&self, max_age_days: u32) -> Result<u64> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        let before = rows.len();
        if max_age_days == 0 {
            rows.clear();
        } else {
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(max_age_days));
            rows.retain(|entry| entry.timestamp >= cutoff);
        }
        Ok((before - rows.len()) as u64)
    }

    async fn delete_project(&self, project: &str) -> Result<u64> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|entry| entry.project != project);
        Ok((before - rows.len()) as u64)
    }

    async fn probe(&self) -> Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.check_available()
    }

    async fn exists(&self) -> Result<bool> {
        self.check_available()?;
        Ok(self.created.load(Ordering::SeqCst))
    }

    async fn snapshot(&self) -> Result<Option<PathBuf>> {
        self.check_available()?;
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Access check answering from fixed project sets.
#[derive(Debug, Default)]
pub struct StaticAccess {
    allow_all: bool,
    visible: HashSet<String>,
    failing: HashSet<String>,
    missing: HashSet<String>,
}

impl StaticAccess {
    /// Every project is visible.
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            ..Default::default()
        }
    }

    /// Only `projects` are visible.
    pub fn allowing(projects: &[&str]) -> Self {
        Self {
            visible: projects.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Checks for `project` fail.
    pub fn with_failing(mut self, project: &str) -> Self {
        self.failing.insert(project.to_string());
        self
    }

    /// `project` has been deleted.
    pub fn with_missing(mut self, project: &str) -> Self {
        self.missing.insert(project.to_string());
        self
    }
}

#[async_trait]
impl ProjectAccess for StaticAccess {
    async fn check(
        &self,
        project: &str,
        _principal: &Principal,
    ) -> std::result::Result<Visibility, AccessError> {
        if self.missing.contains(project) {
            return Err(AccessError::ProjectNotFound(project.to_string()));
        }
        if self.failing.contains(project) {
            return Err(AccessError::Backend(format!(
                "permission backend unavailable for {project}"
            )));
        }
        if self.allow_all || self.visible.contains(project) {
            Ok(Visibility::Visible)
        } else {
            Ok(Visibility::Denied)
        }
    }
}
