//! Port interfaces for realtime event consumers

use async_trait::async_trait;
use petsafe_domain::RealtimeEvent;

/// Subscriber callback for fully-parsed realtime events.
///
/// Handlers receive events in wire order. A handler must not block for
/// long: dispatch is sequential so one slow handler delays the rest.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one decoded event.
    async fn handle_event(&self, event: &RealtimeEvent);
}

/// Local user-facing notification side channel.
///
/// The platform shim posts the actual system notification; the sync core
/// only decides when one is warranted and with what text.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a local notification.
    async fn notify(&self, title: &str, body: &str);
}
