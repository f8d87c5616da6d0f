//! Sync-specific error classification
//!
//! Maps remote API failures onto the three ways a queued action can fail:
//! transiently (charge the retry budget), permanently (fail without budget,
//! never auto-retry) or for authentication (abort the drain, leave the
//! queue untouched).

use thiserror::Error;

use crate::api::{ApiError, ApiErrorCategory};

/// Failure modes of processing one queued action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Retryable failure; increments the action's retry counter.
    #[error("{0}")]
    Transient(String),

    /// Local logic error (undecodable payload, rejected request); marked
    /// failed without consuming retry budget and never retried
    /// automatically.
    #[error("{0}")]
    Permanent(String),

    /// The stored credential was rejected. The drain aborts and every
    /// unprocessed action stays pending for the pass after
    /// re-authentication.
    #[error("re-authentication required: {0}")]
    Auth(String),
}

impl From<ApiError> for ActionError {
    fn from(err: ApiError) -> Self {
        let message = err.to_string();
        match err.category() {
            ApiErrorCategory::Authentication => Self::Auth(message),
            ApiErrorCategory::Server | ApiErrorCategory::Network => Self::Transient(message),
            ApiErrorCategory::Client | ApiErrorCategory::Decode | ApiErrorCategory::Config => {
                Self::Permanent(message)
            }
        }
    }
}
