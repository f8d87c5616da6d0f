//! Typed realtime events and channel connection state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::Alert;

/// A fully-parsed event from the realtime feed.
///
/// Each variant corresponds to one wire event name; the payload fields are
/// decoded from the JSON body the backend attaches to that name.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Handshake event emitted by the server once the stream is open.
    Connected { message: Option<String> },
    /// Someone scanned a pet's QR tag.
    TagScanned {
        pet_id: String,
        pet_name: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
        address: Option<String>,
        scanned_at: Option<DateTime<Utc>>,
    },
    /// A sighting was reported against one of the user's alerts.
    SightingReported {
        alert_id: String,
        pet_id: Option<String>,
        pet_name: Option<String>,
        latitude: f64,
        longitude: f64,
        address: Option<String>,
    },
    /// A missing pet was marked found.
    PetFound { pet_id: String, pet_name: String },
    /// A new alert was created.
    AlertCreated { alert: Alert },
    /// An existing alert changed.
    AlertUpdated { alert: Alert },
}

#[derive(Debug, Deserialize)]
struct ConnectedPayload {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagScannedPayload {
    #[serde(rename = "petId", default)]
    pet_id: Option<String>,
    #[serde(rename = "petName")]
    pet_name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: Option<String>,
    #[serde(rename = "scannedAt")]
    scanned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct SightingReportedPayload {
    #[serde(rename = "alertId")]
    alert_id: String,
    #[serde(rename = "petId")]
    pet_id: Option<String>,
    #[serde(rename = "petName")]
    pet_name: Option<String>,
    latitude: f64,
    longitude: f64,
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PetFoundPayload {
    #[serde(rename = "petId")]
    pet_id: String,
    #[serde(rename = "petName")]
    pet_name: String,
}

impl RealtimeEvent {
    /// Wire event name this variant was decoded from.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::TagScanned { .. } => "tag_scanned",
            Self::SightingReported { .. } => "sighting_reported",
            Self::PetFound { .. } => "pet_found",
            Self::AlertCreated { .. } => "alert_created",
            Self::AlertUpdated { .. } => "alert_updated",
        }
    }

    /// Decode an event from its wire name and JSON payload.
    ///
    /// # Errors
    ///
    /// Returns the serde error for a malformed payload. An unknown event
    /// name is reported through the same channel so the caller can log and
    /// drop it uniformly.
    pub fn decode(name: &str, data: &str) -> std::result::Result<Self, serde_json::Error> {
        match name {
            "connected" => {
                let p: ConnectedPayload = serde_json::from_str(data)?;
                Ok(Self::Connected { message: p.message })
            }
            "tag_scanned" => {
                let p: TagScannedPayload = serde_json::from_str(data)?;
                Ok(Self::TagScanned {
                    pet_id: p.pet_id.unwrap_or_default(),
                    pet_name: p.pet_name,
                    latitude: p.latitude,
                    longitude: p.longitude,
                    address: p.address,
                    scanned_at: p.scanned_at,
                })
            }
            "sighting_reported" => {
                let p: SightingReportedPayload = serde_json::from_str(data)?;
                Ok(Self::SightingReported {
                    alert_id: p.alert_id,
                    pet_id: p.pet_id,
                    pet_name: p.pet_name,
                    latitude: p.latitude,
                    longitude: p.longitude,
                    address: p.address,
                })
            }
            "pet_found" => {
                let p: PetFoundPayload = serde_json::from_str(data)?;
                Ok(Self::PetFound { pet_id: p.pet_id, pet_name: p.pet_name })
            }
            "alert_created" => {
                let alert: Alert = serde_json::from_str(data)?;
                Ok(Self::AlertCreated { alert })
            }
            "alert_updated" => {
                let alert: Alert = serde_json::from_str(data)?;
                Ok(Self::AlertUpdated { alert })
            }
            other => Err(serde::de::Error::custom(format!("unknown event name: {other}"))),
        }
    }

    /// Title/body pair for the local-notification side channel, where this
    /// event type produces one.
    pub fn notification(&self) -> Option<(String, String)> {
        match self {
            Self::TagScanned { pet_name, address, .. } => Some((
                format!("{pet_name}'s tag was scanned"),
                address
                    .clone()
                    .map_or_else(|| "Location unavailable".to_string(), |a| format!("Near {a}")),
            )),
            Self::SightingReported { pet_name, address, .. } => {
                let name = pet_name.as_deref().unwrap_or("your pet");
                Some((
                    format!("New sighting of {name}"),
                    address.clone().map_or_else(
                        || "Open the app for details".to_string(),
                        |a| format!("Reported near {a}"),
                    ),
                ))
            }
            Self::PetFound { pet_name, .. } => {
                Some((format!("{pet_name} was found!"), "Tap to see the details".to_string()))
            }
            Self::Connected { .. } | Self::AlertCreated { .. } | Self::AlertUpdated { .. } => None,
        }
    }
}

/// Connection lifecycle states of the realtime channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

crate::impl_status_conversions!(ChannelState {
    Disconnected => "disconnected",
    Connecting => "connecting",
    Connected => "connected",
});

/// Observable state of the realtime channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ChannelState,
    /// Wire name of the most recently dispatched event.
    pub last_event: Option<String>,
    pub last_error: Option<String>,
    /// Automatic reconnect attempts since the last successful connection.
    pub reconnect_attempts: u32,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ChannelState::Disconnected,
            last_event: None,
            last_error: None,
            reconnect_attempts: 0,
        }
    }
}
