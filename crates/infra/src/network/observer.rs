//! Watch-channel connectivity publisher.
//!
//! The platform shim feeds [`NetworkObserver::report`] with path updates;
//! everything downstream (the sync orchestrator, the UI layer) consumes the
//! state through the [`ConnectivityMonitor`] port. Repeated reports of an
//! unchanged state are not republished, so subscribers only wake on real
//! transitions.

use petsafe_core::ConnectivityMonitor;
use petsafe_domain::Connectivity;
use tokio::sync::watch;
use tracing::info;

/// Publishes the current connectivity state of the device.
pub struct NetworkObserver {
    tx: watch::Sender<Connectivity>,
}

impl NetworkObserver {
    /// Create an observer with the given initial state.
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Record a connectivity change reported by the platform shim.
    pub fn report(&self, connectivity: Connectivity) {
        let changed = self.tx.send_if_modified(|state| {
            if *state == connectivity {
                false
            } else {
                *state = connectivity;
                true
            }
        });

        if changed {
            info!(
                online = connectivity.online,
                transport = ?connectivity.transport,
                "connectivity changed"
            );
        }
    }
}

impl Default for NetworkObserver {
    fn default() -> Self {
        Self::new(Connectivity::OFFLINE)
    }
}

impl ConnectivityMonitor for NetworkObserver {
    fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }
}
