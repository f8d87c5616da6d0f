//! API-specific error types
//!
//! Provides error classification for remote calls with retry metadata.

use std::time::Duration;

use thiserror::Error;

/// Categories of API errors for retry logic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// Authentication errors (401, 403) - surfaced as a re-authentication
    /// condition, never charged against an action's retry budget
    Authentication,
    /// Server errors (5xx) - retryable
    Server,
    /// Client errors (4xx except auth) - non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// Malformed response body - non-retryable
    Decode,
    /// Configuration errors (bad base URL etc.) - non-retryable
    Config,
}

/// API operation errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response decoding failed: {0}")]
    Decode(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),
}

impl ApiError {
    /// Get the error category for this error
    pub fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Auth(_) => ApiErrorCategory::Authentication,
            Self::Server(_) => ApiErrorCategory::Server,
            Self::Client(_) => ApiErrorCategory::Client,
            Self::Network(_) | Self::Timeout(_) => ApiErrorCategory::Network,
            Self::Decode(_) => ApiErrorCategory::Decode,
            Self::InvalidUrl(_) => ApiErrorCategory::Config,
        }
    }

    /// Check if a queued action failing with this error should be retried
    pub fn should_retry(&self) -> bool {
        matches!(self.category(), ApiErrorCategory::Server | ApiErrorCategory::Network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            ApiError::Auth("test".to_string()).category(),
            ApiErrorCategory::Authentication
        );
        assert_eq!(ApiError::Server("test".to_string()).category(), ApiErrorCategory::Server);
        assert_eq!(ApiError::Network("test".to_string()).category(), ApiErrorCategory::Network);
        assert_eq!(ApiError::Decode("test".to_string()).category(), ApiErrorCategory::Decode);
        assert_eq!(
            ApiError::Timeout(Duration::from_secs(1)).category(),
            ApiErrorCategory::Network
        );
    }

    #[test]
    fn test_should_retry() {
        assert!(ApiError::Server("test".to_string()).should_retry());
        assert!(ApiError::Network("test".to_string()).should_retry());
        assert!(!ApiError::Auth("test".to_string()).should_retry());
        assert!(!ApiError::Client("test".to_string()).should_retry());
        assert!(!ApiError::Decode("test".to_string()).should_retry());
    }
}
