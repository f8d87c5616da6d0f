//! Remote API client
//!
//! The backend is an opaque remote service reached over HTTPS. The
//! [`RemoteApi`] trait is the seam the sync orchestrator and the UI layer
//! program against; [`ApiClient`] is the reqwest-backed implementation.

pub mod auth;
pub mod client;
pub mod errors;

use async_trait::async_trait;
pub use auth::CredentialProvider;
pub use client::{ApiClient, ApiClientConfig};
pub use errors::{ApiError, ApiErrorCategory};
use petsafe_domain::{Alert, AlertRequest, Pet, PetUpdate, Sighting, SightingRequest};

/// Remote service operations consumed by the sync orchestrator and the UI
/// layer. All calls are asynchronous and return decoded domain objects or a
/// typed [`ApiError`].
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Authoritative list of the user's pets.
    async fn get_pets(&self) -> Result<Vec<Pet>, ApiError>;

    /// Authoritative list of the user's alerts.
    async fn get_alerts(&self) -> Result<Vec<Alert>, ApiError>;

    /// Create an alert.
    async fn create_alert(&self, request: &AlertRequest) -> Result<Alert, ApiError>;

    /// Clear a pet's missing flag.
    async fn mark_pet_found(&self, pet_id: &str) -> Result<Pet, ApiError>;

    /// Apply a partial update to a pet.
    async fn update_pet(&self, pet_id: &str, update: &PetUpdate) -> Result<Pet, ApiError>;

    /// Report a sighting against an alert.
    async fn report_sighting(
        &self,
        alert_id: &str,
        request: &SightingRequest,
    ) -> Result<Sighting, ApiError>;
}
