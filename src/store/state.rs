//! Online/offline state machine.

use tokio::sync::{watch, Mutex, MutexGuard};

use super::prober::ProbeHandle;

/// Which store receives writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Primary store active.
    Online,
    /// Fallback store active; the prober is looking for the primary.
    Offline,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Online => f.write_str("online"),
            Mode::Offline => f.write_str("offline"),
        }
    }
}

/// Current mode plus the prober handle.
///
/// Readers see the mode without locking. Writers go through a `Transition`,
/// so at most one transition runs at a time.
pub struct ConnectionState {
    mode: watch::Sender<Mode>,
    probe: Mutex<Option<ProbeHandle>>,
}

impl ConnectionState {
    pub fn new(initial: Mode) -> Self {
        let (mode, _) = watch::channel(initial);
        Self {
            mode,
            probe: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Mode> {
        self.mode.subscribe()
    }

    /// Wait for any running transition to finish, then start one.
    pub async fn begin_transition(&self) -> Transition<'_> {
        Transition {
            mode: &self.mode,
            probe: self.probe.lock().await,
        }
    }
}

/// Exclusive access to the state for the duration of one transition.
pub struct Transition<'a> {
    mode: &'a watch::Sender<Mode>,
    probe: MutexGuard<'a, Option<ProbeHandle>>,
}

impl Transition<'_> {
    pub fn mode(&self) -> Mode {
        *self.mode.borrow()
    }

    /// Publish `mode`, returning the previous one.
    pub fn set_mode(&mut self, mode: Mode) -> Mode {
        self.mode.send_replace(mode)
    }

    pub fn probe_running(&self) -> bool {
        self.probe.as_ref().is_some_and(ProbeHandle::is_running)
    }

    /// Cooperatively stop the prober, if any.
    pub fn cancel_probe(&mut self) {
        if let Some(handle) = self.probe.take() {
            handle.cancel();
        }
    }

    /// Stop the prober immediately, if any.
    pub fn abort_probe(&mut self) {
        if let Some(handle) = self.probe.take() {
            handle.abort();
        }
    }

    pub fn install_probe(&mut self, handle: ProbeHandle) {
        if let Some(previous) = self.probe.replace(handle) {
            previous.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mode_changes_only_through_transition() {
        let state = ConnectionState::new(Mode::Online);
        let mut watcher = state.subscribe();
        assert_eq!(state.mode(), Mode::Online);

        {
            let mut transition = state.begin_transition().await;
            assert_eq!(transition.set_mode(Mode::Offline), Mode::Online);
            assert_eq!(transition.mode(), Mode::Offline);
            assert!(!transition.probe_running());
        }

        assert_eq!(state.mode(), Mode::Offline);
        assert!(watcher.has_changed().unwrap());
        assert_eq!(*watcher.borrow_and_update(), Mode::Offline);
    }

    #[tokio::test]
    async fn test_transitions_are_serialized() {
        let state = std::sync::Arc::new(ConnectionState::new(Mode::Online));
        let first = state.begin_transition().await;

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move {
                let mut transition = state.begin_transition().await;
                transition.set_mode(Mode::Offline);
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        assert_eq!(state.mode(), Mode::Online);

        drop(first);
        waiter.await.unwrap();
        assert_eq!(state.mode(), Mode::Offline);
    }
}
