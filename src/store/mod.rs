//! Failover event store.
//!
//! Writes go to the primary store while it is reachable. After a write
//! exhausts its retries the store goes offline: writes go to the local
//! fallback, queries are refused, and a prober watches for the primary. When
//! the primary answers again the fallback rows are copied into it and the
//! fallback is cleared.

pub mod prober;
pub mod state;


use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use backon::BackoffBuilder;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::event::{EventEntry, ProjectEvent};
use crate::interfaces::{
    AccessError, EventFilter, Principal, ProjectAccess, Result, RowStore, StorageError,
    Visibility,
};
use crate::services::RetentionSweeper;
use crate::utils::retry::failover_backoff;

pub use prober::{ProbeHandle, Reconnect, ReconnectionProber};
pub use state::{ConnectionState, Mode, Transition};

/// Retry, reconnection and retention settings.
#[derive(Debug, Clone)]
pub struct FailoverSettings {
    /// Attempts per write, including the first.
    pub max_tries: u32,
    /// Pause between write attempts.
    pub wait_time: Duration,
    /// Interval between reconnection probes.
    pub connect_time: Duration,
    pub max_age_days: u32,
    /// Snapshot the fallback before clearing it.
    pub copy_local: bool,
}

impl Default for FailoverSettings {
    fn default() -> Self {
        Self {
            max_tries: 3,
            wait_time: Duration::from_secs(1),
            connect_time: Duration::from_secs(1),
            max_age_days: 30,
            copy_local: false,
        }
    }
}

/// Event store that falls back to local storage while the primary is down.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct FailoverEventStore {
    inner: Arc<Inner>,
}

struct Inner {
    primary: Arc<dyn RowStore>,
    fallback: Arc<dyn RowStore>,
    access: Arc<dyn ProjectAccess>,
    sweeper: Arc<RetentionSweeper>,
    settings: FailoverSettings,
    state: ConnectionState,
    /// Shared by fallback writes, exclusive while the fallback is drained.
    fallback_gate: RwLock<()>,
    shutdown: watch::Sender<bool>,
    this: Weak<Inner>,
}

impl FailoverEventStore {
    pub fn new(
        primary: Arc<dyn RowStore>,
        fallback: Arc<dyn RowStore>,
        access: Arc<dyn ProjectAccess>,
        sweeper: Arc<RetentionSweeper>,
        settings: FailoverSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new_cyclic(|this| Inner {
            primary,
            fallback,
            access,
            sweeper,
            settings,
            state: ConnectionState::new(Mode::Online),
            fallback_gate: RwLock::new(()),
            shutdown,
            this: this.clone(),
        });
        Self { inner }
    }

    /// Run setup in the current mode, then schedule the retention sweep.
    pub async fn start(&self) {
        let mode = self.inner.state.mode();
        self.inner.transition(mode).await;
        self.inner
            .sweeper
            .schedule_cleaning(self.inner.settings.max_age_days);
        info!(mode = %self.mode(), "Event store started");
    }

    /// Stop background work and close both stores.
    ///
    /// Writes waiting to retry give up.
    pub async fn stop(&self) {
        self.inner.shutdown.send_replace(true);
        {
            let mut transition = self.inner.state.begin_transition().await;
            transition.abort_probe();
        }
        self.inner.sweeper.stop();
        self.inner.primary.close().await;
        self.inner.fallback.close().await;
        info!("Event store stopped");
    }

    /// Store one event in whichever store is active.
    ///
    /// Failures are logged, never returned. Events without a project are
    /// ignored.
    pub async fn store_event(&self, event: &ProjectEvent) {
        self.inner.store_event(event).await
    }

    /// Payloads of the events matching `filter` that `principal` may see,
    /// oldest first.
    ///
    /// Fails with `ServiceUnavailable` while offline.
    pub async fn query_events(
        &self,
        filter: &EventFilter,
        principal: &Principal,
    ) -> Result<Vec<String>> {
        self.inner.query_events(filter, principal).await
    }

    /// Copy fallback rows into the primary now. Does nothing while offline.
    pub async fn restore_now(&self) {
        let _transition = self.inner.state.begin_transition().await;
        if self.inner.state.mode() == Mode::Online {
            self.inner.restore_events_from_fallback().await;
        }
    }

    pub fn mode(&self) -> Mode {
        self.inner.state.mode()
    }

    pub fn is_online(&self) -> bool {
        self.mode() == Mode::Online
    }

    /// Watch mode changes.
    pub fn subscribe(&self) -> watch::Receiver<Mode> {
        self.inner.state.subscribe()
    }

    pub fn sweeper(&self) -> &Arc<RetentionSweeper> {
        &self.inner.sweeper
    }
}

impl Inner {
    fn client(&self, mode: Mode) -> &Arc<dyn RowStore> {
        match mode {
            Mode::Online => &self.primary,
            Mode::Offline => &self.fallback,
        }
    }

    async fn store_event(&self, event: &ProjectEvent) {
        let Some(project) = event.project_name() else {
            debug!("Event has no project; not stored");
            return;
        };
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow() {
            warn!(project, "Event store is stopped; event dropped");
            return;
        }

        let timestamp = event.timestamp();
        let mut delays =
            failover_backoff(self.settings.max_tries, self.settings.wait_time).build();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let (mode, result) = self.insert_active(project, timestamp, &event.payload).await;
            let err = match result {
                Ok(()) => {
                    if attempt > 1 {
                        info!(project, attempt, %mode, "Event stored after retrying");
                    }
                    return;
                }
                Err(e) => e,
            };

            if !err.is_transient() {
                error!(project, error = %err, %mode, "Failed to store event");
                return;
            }

            let Some(delay) = delays.next() else {
                error!(
                    project,
                    attempts = attempt,
                    error = %err,
                    %mode,
                    "Failed to store event; switching to local storage"
                );
                self.transition(Mode::Offline).await;
                return;
            };

            warn!(
                project,
                attempt,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Failed to store event; retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    warn!(project, "Event store stopping; event dropped");
                    return;
                }
            }
        }
    }

    /// Insert into the store for the current mode.
    ///
    /// Fallback inserts hold the gate, so a drain never clears a row that is
    /// still being written. The mode is read again once the gate is held.
    async fn insert_active(
        &self,
        project: &str,
        timestamp: DateTime<Utc>,
        payload: &str,
    ) -> (Mode, Result<()>) {
        if self.state.mode() == Mode::Online {
            return (Mode::Online, self.primary.insert(project, timestamp, payload).await);
        }

        let _gate = self.fallback_gate.read().await;
        let mode = self.state.mode();
        let result = self.client(mode).insert(project, timestamp, payload).await;
        (mode, result)
    }

    async fn query_events(
        &self,
        filter: &EventFilter,
        principal: &Principal,
    ) -> Result<Vec<String>> {
        if self.state.mode() == Mode::Offline {
            return Err(StorageError::ServiceUnavailable);
        }

        let grouped = self.primary.query(filter).await?;

        let mut visible = Vec::new();
        for (project, entries) in grouped {
            match self.access.check(&project, principal).await {
                Ok(Visibility::Visible) => visible.extend(entries),
                Ok(Visibility::Denied) => {}
                Err(AccessError::ProjectNotFound(_)) => {
                    info!(project = %project, "Project no longer exists; removing its events");
                    self.sweeper.remove_project_events_async(&project);
                }
                Err(e) => {
                    warn!(
                        project = %project,
                        user = %principal.username,
                        error = %e,
                        "Cannot check project visibility; skipping its events"
                    );
                }
            }
        }

        visible.sort();
        Ok(visible.into_iter().map(|entry| entry.payload).collect())
    }

    /// The only place the mode changes.
    ///
    /// Ensures the schema of the store for `target`, then reconciles when
    /// online or starts the prober when offline.
    async fn transition(&self, target: Mode) {
        let mut transition = self.state.begin_transition().await;
        let stopping = *self.shutdown.borrow();

        if target == Mode::Online {
            transition.cancel_probe();
        }
        let previous = transition.set_mode(target);
        if previous != target {
            info!(from = %previous, to = %target, "Event store mode changed");
        }

        let mut mode = target;
        if let Err(e) = self.client(mode).ensure_schema().await {
            match mode {
                Mode::Online => {
                    warn!(error = %e, "Cannot set up primary store; switching to local storage");
                    mode = Mode::Offline;
                    transition.set_mode(mode);
                    if let Err(e) = self.fallback.ensure_schema().await {
                        error!(error = %e, "Cannot set up local storage");
                    }
                }
                Mode::Offline => error!(error = %e, "Cannot set up local storage"),
            }
        }

        match mode {
            Mode::Online => self.restore_events_from_fallback().await,
            Mode::Offline if stopping => {}
            Mode::Offline => {
                if !transition.probe_running() {
                    let target: Weak<dyn Reconnect> = self.this.clone();
                    transition.install_probe(ReconnectionProber::spawn(
                        target,
                        self.settings.connect_time,
                    ));
                }
            }
        }
    }

    /// Copy every fallback row into the primary, then clear the fallback.
    ///
    /// Rows that fail to copy are dropped.
    async fn restore_events_from_fallback(&self) {
        match self.fallback.exists().await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                error!(error = %e, "Cannot check local storage");
                return;
            }
        }

        let _gate = self.fallback_gate.write().await;
        match self.fallback.query_all().await {
            Ok(entries) if entries.is_empty() => {
                debug!("No locally stored events to restore");
                return;
            }
            Ok(entries) => self.copy_into_primary(&entries).await,
            Err(e) => warn!(error = %e, "Cannot read locally stored events"),
        }

        if self.settings.copy_local {
            match self.fallback.snapshot().await {
                Ok(Some(path)) => info!(path = %path.display(), "Copied local storage"),
                Ok(None) => {}
                Err(e) => error!(error = %e, "Failed to copy local storage"),
            }
        }

        if let Err(e) = self.fallback.delete_older_than(0).await {
            error!(error = %e, "Failed to clear local storage");
        }
    }

    async fn copy_into_primary(&self, entries: &[EventEntry]) {
        let mut copied = 0usize;
        for entry in entries {
            match self
                .primary
                .insert(&entry.project, entry.timestamp, &entry.payload)
                .await
            {
                Ok(()) => copied += 1,
                Err(e) => error!(
                    id = entry.id,
                    project = %entry.project,
                    error = %e,
                    "Failed to restore locally stored event; dropping it"
                ),
            }
        }
        info!(copied, total = entries.len(), "Restored locally stored events");
    }
}

#[async_trait]
impl Reconnect for Inner {
    async fn probe(&self) -> bool {
        match self.primary.probe().await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Primary store still unreachable");
                false
            }
        }
    }

    async fn reconnected(&self) {
        if self.state.mode() == Mode::Online {
            return;
        }
        self.transition(Mode::Online).await;
    }
}
