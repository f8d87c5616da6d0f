//! Observable sync and connectivity state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observable state of the sync orchestrator, published on every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub pending_actions: usize,
    /// Short human-readable status line, e.g. "Sync failed: server error".
    pub message: String,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            is_syncing: false,
            last_sync_at: None,
            pending_actions: 0,
            message: "Idle".to_string(),
        }
    }
}

/// Transport the device is currently using
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Wifi,
    Cellular,
    Wired,
    Unknown,
}

/// Connectivity snapshot published by the network observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectivity {
    pub online: bool,
    pub transport: Transport,
}

impl Connectivity {
    /// Connectivity for a device with no usable network path.
    pub const OFFLINE: Self = Self { online: false, transport: Transport::Unknown };

    /// Convenience constructor for an online snapshot.
    pub fn online(transport: Transport) -> Self {
        Self { online: true, transport }
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::OFFLINE
    }
}
