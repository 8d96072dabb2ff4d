//! Snapshot-style state view
//!
//! A watch channel carrying the service status. Writers mutate through
//! narrow update closures; readers clone the current snapshot and never
//! hold a lock across awaits.

use felarr_core::{ServiceState, StatusSnapshot};
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct StateView {
    tx: watch::Sender<StatusSnapshot>,
}

impl StateView {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusSnapshot::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    pub fn update(&self, mutate: impl FnOnce(&mut StatusSnapshot)) {
        self.tx.send_modify(mutate);
    }

    pub fn set_state(&self, state: ServiceState) {
        self.update(|snapshot| snapshot.state = state);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.update(|snapshot| snapshot.last_error = error);
    }
}

impl Default for StateView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_are_visible_to_snapshots() {
        let view = StateView::new();
        assert_eq!(view.snapshot().state, ServiceState::Idle);

        view.set_state(ServiceState::Scanning);
        view.update(|s| s.dv_count = 42);

        let snapshot = view.snapshot();
        assert_eq!(snapshot.state, ServiceState::Scanning);
        assert_eq!(snapshot.dv_count, 42);
    }
}
