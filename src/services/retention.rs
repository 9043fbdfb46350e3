//! Retention sweeper.
//!
//! Deletes primary rows past the retention age once a night, and purges a
//! project's rows when the project is deleted.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::interfaces::{Result, RowStore};

/// Local hour at which the nightly sweep runs.
pub const SWEEP_HOUR: u32 = 23;

/// Time between sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Receives project deletion notifications.
pub trait ProjectDeletedListener: Send + Sync {
    /// Must not block; the work happens in the background.
    fn on_project_deleted(&self, project: &str);
}

/// Time from `now` until the next sweep.
///
/// The sweep runs at `SWEEP_HOUR`:00:00 local time, today if that moment has
/// not passed yet, tomorrow otherwise.
pub fn initial_delay<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let local = now.naive_local();
    let mut next = local
        .date()
        .and_hms_opt(SWEEP_HOUR, 0, 0)
        .unwrap_or(local);
    if local > next {
        next += chrono::Duration::days(1);
    }
    (next - local).to_std().unwrap_or_default()
}

/// Background retention jobs over the primary store.
pub struct RetentionSweeper {
    primary: Arc<dyn RowStore>,
    stop: watch::Sender<bool>,
    schedule: Mutex<Option<JoinHandle<()>>>,
}

impl RetentionSweeper {
    pub fn new(primary: Arc<dyn RowStore>) -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            primary,
            stop,
            schedule: Mutex::new(None),
        }
    }

    /// Start the nightly sweep, replacing any earlier schedule.
    pub fn schedule_cleaning(&self, max_age_days: u32) {
        let primary = Arc::clone(&self.primary);
        let mut stop = self.stop.subscribe();

        let task = tokio::spawn(async move {
            let delay = initial_delay(&Local::now());
            info!(
                max_age_days,
                first_run_in_secs = delay.as_secs(),
                "Retention sweep scheduled"
            );

            let mut ticks =
                tokio::time::interval_at(tokio::time::Instant::now() + delay, SWEEP_INTERVAL);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                if *stop.borrow() {
                    break;
                }
                tokio::select! {
                    _ = ticks.tick() => sweep(primary.as_ref(), max_age_days).await,
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Retention sweep stopped");
        });

        let previous = self
            .schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Delete rows older than `max_age_days` now.
    pub async fn run_once(&self, max_age_days: u32) -> Result<u64> {
        self.primary.delete_older_than(max_age_days).await
    }

    /// Delete every row of `project` in the background.
    pub fn remove_project_events_async(&self, project: &str) -> JoinHandle<()> {
        let primary = Arc::clone(&self.primary);
        let project = project.to_string();

        tokio::spawn(async move {
            match primary.delete_project(&project).await {
                Ok(deleted) => info!(project = %project, deleted, "Removed events of deleted project"),
                Err(e) => error!(project = %project, error = %e, "Failed to remove project events"),
            }
        })
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the nightly sweep. Purges already requested still run.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

impl ProjectDeletedListener for RetentionSweeper {
    fn on_project_deleted(&self, project: &str) {
        self.remove_project_events_async(project);
    }
}

async fn sweep(primary: &dyn RowStore, max_age_days: u32) {
    match primary.delete_older_than(max_age_days).await {
        Ok(deleted) => info!(deleted, max_age_days, "Retention sweep finished"),
        Err(e) => error!(error = %e, max_age_days, "Retention sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockRowStore;
    use chrono::{FixedOffset, Utc};

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 14, hour, min, sec)
            .unwrap()
    }

    #[test]
    fn test_initial_delay_same_day() {
        assert_eq!(initial_delay(&at(22, 0, 0)), Duration::from_secs(3600));
        assert_eq!(initial_delay(&at(0, 0, 0)), Duration::from_secs(23 * 3600));
    }

    #[test]
    fn test_initial_delay_exactly_at_sweep_hour() {
        assert_eq!(initial_delay(&at(23, 0, 0)), Duration::ZERO);
    }

    #[test]
    fn test_initial_delay_after_sweep_hour_is_next_day() {
        assert_eq!(
            initial_delay(&at(23, 0, 1)),
            Duration::from_secs(24 * 3600 - 1)
        );
        assert_eq!(initial_delay(&at(23, 30, 0)), Duration::from_secs(23 * 3600 + 1800));
    }

    #[tokio::test]
    async fn test_run_once_deletes_old_rows() {
        let primary = Arc::new(MockRowStore::new());
        let now = Utc::now();
        primary
            .insert("p", now - chrono::Duration::days(31), "old")
            .await
            .unwrap();
        primary
            .insert("p", now - chrono::Duration::days(29), "recent")
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(primary.clone());
        assert_eq!(sweeper.run_once(30).await.unwrap(), 1);
        assert_eq!(sweeper.run_once(30).await.unwrap(), 0);

        let payloads: Vec<String> = primary.rows().await.into_iter().map(|e| e.payload).collect();
        assert_eq!(payloads, vec!["recent"]);
    }

    #[tokio::test]
    async fn test_project_deleted_purges_in_background() {
        let primary = Arc::new(MockRowStore::new());
        let now = Utc::now();
        primary.insert("gone", now, "a").await.unwrap();
        primary.insert("kept", now, "b").await.unwrap();

        let sweeper = RetentionSweeper::new(primary.clone());
        sweeper.remove_project_events_async("gone").await.unwrap();

        let projects: Vec<String> = primary.rows().await.into_iter().map(|e| e.project).collect();
        assert_eq!(projects, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_purge_failure_is_contained() {
        let primary = Arc::new(MockRowStore::new());
        primary.set_outage(true);

        let sweeper = RetentionSweeper::new(primary.clone());
        sweeper.remove_project_events_async("p").await.unwrap();
    }

    #[tokio::test]
    async fn test_schedule_and_stop() {
        let sweeper = RetentionSweeper::new(Arc::new(MockRowStore::new()));
        sweeper.schedule_cleaning(30);
        assert!(sweeper.is_scheduled());

        sweeper.stop();
        for _ in 0..100 {
            if !sweeper.is_scheduled() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sweep still scheduled after stop");
    }
}
