//! Realtime event channel
//!
//! Long-lived server-sent-events connection with incremental protocol
//! parsing, typed event dispatch and exponential-backoff reconnection.

pub mod channel;
pub mod parser;

use async_trait::async_trait;
pub use channel::{EventChannel, EventChannelConfig};
pub use parser::{SseFrame, SseParser};
use petsafe_core::Notifier;
use tracing::info;

/// Default notifier that only logs. The platform shim substitutes a real
/// system-notification implementation.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, body: &str) {
        info!(title, body, "local notification");
    }
}
