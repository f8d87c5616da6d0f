//! Port interface for connectivity monitoring

use petsafe_domain::Connectivity;
use tokio::sync::watch;

/// Publishes the device's connectivity state.
///
/// The platform shim feeds the concrete implementation; consumers either
/// poll [`current`](ConnectivityMonitor::current) or watch for transitions
/// via [`subscribe`](ConnectivityMonitor::subscribe).
pub trait ConnectivityMonitor: Send + Sync {
    /// Connectivity snapshot as of now.
    fn current(&self) -> Connectivity;

    /// Watch receiver that yields every connectivity change.
    fn subscribe(&self) -> watch::Receiver<Connectivity>;
}
