//! Reqwest-backed implementation of the remote API.
//!
//! Every call attaches a bearer token from the [`CredentialProvider`],
//! enforces the configured timeout, and maps HTTP status classes onto the
//! typed [`ApiError`] taxonomy. A 401 response invalidates the stored
//! credential before the error is surfaced.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use petsafe_domain::{Alert, AlertRequest, Pet, PetUpdate, Sighting, SightingRequest};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::auth::CredentialProvider;
use super::errors::ApiError;
use super::RemoteApi;

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL for the API (e.g., "https://api.petsafe.app/v1")
    pub base_url: String,
    /// Timeout for API requests
    pub timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self { base_url: "https://api.petsafe.app/v1".to_string(), timeout: Duration::from_secs(30) }
    }
}

/// HTTP client for the remote pet-safety service
pub struct ApiClient {
    http: ReqwestClient,
    config: ApiClientConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] when the configured base URL does
    /// not parse, and a config error when the underlying client cannot be
    /// built.
    pub fn new(
        config: ApiClientConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ApiError> {
        reqwest::Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.base_url)))?;

        let http = ReqwestClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::InvalidUrl(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config, credentials })
    }

    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let token = self.credentials.access_token().await?;
        let url = format!("{}{}", self.config.base_url, path);

        Ok(self
            .http
            .request(method, url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Content-Type", "application/json"))
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(self.config.timeout)
            } else {
                ApiError::Network(e.to_string())
            }
        })?;
        let response = self.check_status(response).await?;

        response.json::<T>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn check_status(&self, response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() { status.to_string() } else { body };

        match status {
            StatusCode::UNAUTHORIZED => {
                warn!("remote rejected credential, invalidating");
                self.credentials.invalidate().await;
                Err(ApiError::Auth("stored credential was rejected".into()))
            }
            s if s.is_server_error() => Err(ApiError::Server(message)),
            _ => Err(ApiError::Client(format!("{status}: {message}"))),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        debug!(path, "GET request");
        let builder = self.authorized(Method::GET, path).await?;
        self.execute(builder).await
    }

    async fn send_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        debug!(%method, path, "request with body");
        let builder = self.authorized(method, path).await?.json(body);
        self.execute(builder).await
    }
}

#[async_trait]
impl RemoteApi for ApiClient {
    #[instrument(skip(self))]
    async fn get_pets(&self) -> Result<Vec<Pet>, ApiError> {
        self.get_json("/pets").await
    }

    #[instrument(skip(self))]
    async fn get_alerts(&self) -> Result<Vec<Alert>, ApiError> {
        self.get_json("/alerts").await
    }

    #[instrument(skip(self, request), fields(pet_id = %request.pet_id))]
    async fn create_alert(&self, request: &AlertRequest) -> Result<Alert, ApiError> {
        self.send_json(Method::POST, "/alerts", request).await
    }

    #[instrument(skip(self))]
    async fn mark_pet_found(&self, pet_id: &str) -> Result<Pet, ApiError> {
        let builder = self.authorized(Method::POST, &format!("/pets/{pet_id}/found")).await?;
        self.execute(builder).await
    }

    #[instrument(skip(self, update))]
    async fn update_pet(&self, pet_id: &str, update: &PetUpdate) -> Result<Pet, ApiError> {
        self.send_json(Method::PATCH, &format!("/pets/{pet_id}"), update).await
    }

    #[instrument(skip(self, request))]
    async fn report_sighting(
        &self,
        alert_id: &str,
        request: &SightingRequest,
    ) -> Result<Sighting, ApiError> {
        self.send_json(Method::POST, &format!("/alerts/{alert_id}/sightings"), request).await
    }
}
