//! API authentication seam
//!
//! Credential storage itself (keychain, biometric unlock) is a platform
//! concern; the sync core only needs a token to attach and a way to drop a
//! credential the server rejected.

use async_trait::async_trait;

use super::errors::ApiError;

/// Trait for providing and invalidating the stored credential.
///
/// This trait allows dependency injection and testing with mock providers.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Get the current bearer token.
    async fn access_token(&self) -> Result<String, ApiError>;

    /// Drop the stored credential. Called when the server answers 401, so
    /// the next call forces re-authentication instead of replaying a dead
    /// token.
    async fn invalidate(&self);
}
