//! Queued offline actions
//!
//! A queued action is a durable record of a locally-originated mutation
//! awaiting remote execution. Payloads are a tagged variant per action kind
//! so a stored envelope either decodes into a fully-typed mutation or fails
//! as a whole; there is no partially-valid payload state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::{AlertRequest, PetUpdate, SightingRequest, ALERT_TYPE_MISSING_PET};

/// Strongly-typed payload of a queued action, serialized to a tagged JSON
/// envelope (`{"type": "...", ...}`) for storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionPayload {
    /// Report the pet missing and raise a missing-pet alert.
    MarkPetLost {
        pet_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        latitude: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        longitude: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
    /// Clear the pet's missing flag on the remote service.
    MarkPetFound { pet_id: String },
    /// Report a sighting against an active alert.
    ReportSighting { alert_id: String, request: SightingRequest },
    /// Create an alert, optionally replacing a local-only placeholder.
    CreateAlert {
        request: AlertRequest,
        #[serde(skip_serializing_if = "Option::is_none")]
        placeholder_alert_id: Option<String>,
    },
    /// Partial update of pet fields.
    UpdatePet { pet_id: String, update: PetUpdate },
}

impl ActionPayload {
    /// Stable tag string for this action kind, used as the queue record's
    /// `kind` column and in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MarkPetLost { .. } => "mark_pet_lost",
            Self::MarkPetFound { .. } => "mark_pet_found",
            Self::ReportSighting { .. } => "report_sighting",
            Self::CreateAlert { .. } => "create_alert",
            Self::UpdatePet { .. } => "update_pet",
        }
    }

    /// Build the alert request a `MarkPetLost` action maps to.
    pub fn missing_pet_alert(
        pet_id: String,
        message: Option<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
        address: Option<String>,
    ) -> AlertRequest {
        AlertRequest {
            pet_id,
            alert_type: ALERT_TYPE_MISSING_PET.to_string(),
            message,
            latitude,
            longitude,
            address,
        }
    }
}

/// Queue record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Failed,
}

crate::impl_status_conversions!(ActionStatus {
    Pending => "pending",
    Failed => "failed",
});

/// Durable queue record for a locally-originated mutation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedAction {
    pub id: String,
    /// Tag string of the payload variant (denormalized for queries/logs).
    pub kind: String,
    /// Tagged JSON envelope of the [`ActionPayload`].
    pub payload_json: String,
    pub status: ActionStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueuedAction {
    /// Decode the stored payload envelope back into its typed variant.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error when the envelope carries an
    /// unknown tag or malformed fields, which is a permanent local error,
    /// never a transient one.
    pub fn payload(&self) -> std::result::Result<ActionPayload, serde_json::Error> {
        serde_json::from_str(&self.payload_json)
    }
}
