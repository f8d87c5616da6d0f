//! Cached entity snapshots and remote mutation DTOs
//!
//! Entities mirror the remote schema field-for-field (camelCase on the
//! wire). `last_synced_at` is a local bookkeeping stamp written by the
//! offline store and never crosses the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local mirror of a server-owned pet record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pet {
    pub id: String,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    pub name: String,
    pub species: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "photoUrl", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(rename = "qrTagId", skip_serializing_if = "Option::is_none")]
    pub qr_tag_id: Option<String>,
    #[serde(rename = "isMissing")]
    pub is_missing: bool,
    #[serde(rename = "lastSeenLatitude", skip_serializing_if = "Option::is_none")]
    pub last_seen_latitude: Option<f64>,
    #[serde(rename = "lastSeenLongitude", skip_serializing_if = "Option::is_none")]
    pub last_seen_longitude: Option<f64>,
    #[serde(rename = "lastSeenAddress", skip_serializing_if = "Option::is_none")]
    pub last_seen_address: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Local mirror of a server-owned alert record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "petId")]
    pub pet_id: String,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    #[serde(rename = "alertType")]
    pub alert_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// Local mirror of a reunion success story
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuccessStory {
    pub id: String,
    #[serde(rename = "petId")]
    pub pet_id: String,
    pub title: String,
    pub story: String,
    #[serde(rename = "isPublic")]
    pub is_public: bool,
    #[serde(rename = "isConfirmed")]
    pub is_confirmed: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// A sighting reported against an alert. Returned by the remote service,
/// not cached locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sighting {
    pub id: String,
    #[serde(rename = "alertId")]
    pub alert_id: String,
    #[serde(rename = "reporterName", skip_serializing_if = "Option::is_none")]
    pub reporter_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Request body for creating an alert
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRequest {
    #[serde(rename = "petId")]
    pub pet_id: String,
    #[serde(rename = "alertType")]
    pub alert_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Request body for reporting a sighting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SightingRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(rename = "reporterName", skip_serializing_if = "Option::is_none")]
    pub reporter_name: Option<String>,
}

/// Partial pet update. Only fields that are present are serialized, so the
/// remote service applies exactly the fields the caller set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "photoUrl", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(rename = "isMissing", skip_serializing_if = "Option::is_none")]
    pub is_missing: Option<bool>,
    #[serde(rename = "lastSeenLatitude", skip_serializing_if = "Option::is_none")]
    pub last_seen_latitude: Option<f64>,
    #[serde(rename = "lastSeenLongitude", skip_serializing_if = "Option::is_none")]
    pub last_seen_longitude: Option<f64>,
    #[serde(rename = "lastSeenAddress", skip_serializing_if = "Option::is_none")]
    pub last_seen_address: Option<String>,
}

/// Alert type raised when a pet is reported missing.
pub const ALERT_TYPE_MISSING_PET: &str = "missing_pet";
