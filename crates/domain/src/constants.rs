//! Domain constants shared across the sync core

use std::time::Duration;

/// Retry ceiling for queued actions. The failure that brings an action's
/// retry count to this value deletes the action from the queue.
pub const MAX_ACTION_RETRIES: i32 = 5;

/// Interval between automatic background sync passes.
pub const AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Maximum automatic reconnect attempts for the realtime channel before the
/// terminal connection error is surfaced.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Base delay for the realtime channel's exponential reconnect backoff.
/// Doubles per attempt: 1s, 2s, 4s, 8s, 16s.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
