//! Reconnection prober.
//!
//! Runs while the store is offline, checking the primary every interval
//! until it answers.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Store-side callbacks driven by the prober.
#[async_trait]
pub trait Reconnect: Send + Sync {
    /// Whether the primary store is reachable.
    async fn probe(&self) -> bool;

    /// Called once, after the first successful probe.
    async fn reconnected(&self);
}

/// Handle to a running prober task.
pub struct ProbeHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Ask the prober to stop at its next check.
    ///
    /// Does not interrupt a callback in progress, so it is safe to call from
    /// inside `Reconnect::reconnected`.
    pub fn cancel(&self) {
        let _ = self.cancel.send_replace(true);
    }

    /// Stop the prober immediately.
    pub fn abort(&self) {
        self.cancel();
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

pub struct ReconnectionProber;

impl ReconnectionProber {
    /// Spawn a prober that checks `target` immediately, then every `interval`.
    ///
    /// The prober exits after the first successful probe, when cancelled, or
    /// when `target` has been dropped.
    pub fn spawn(target: Weak<dyn Reconnect>, interval: Duration) -> ProbeHandle {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                interval_ms = interval.as_millis() as u64,
                "Reconnection prober started"
            );

            loop {
                if *cancel_rx.borrow() {
                    break;
                }
                let Some(store) = target.upgrade() else {
                    debug!("Store dropped; reconnection prober exiting");
                    break;
                };

                if store.probe().await {
                    if *cancel_rx.borrow() {
                        break;
                    }
                    info!("Primary store is reachable again");
                    store.reconnected().await;
                    break;
                }
                drop(store);

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = cancel_rx.changed() => {
                        if changed.is_err() || *cancel_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("Reconnection prober stopped");
        });

        ProbeHandle {
            cancel: cancel_tx,
            task,
        }
    }
}
