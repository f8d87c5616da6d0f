//! Conversions from external infrastructure errors into domain errors.

use petsafe_domain::PetSafeError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can
/// be converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub PetSafeError);

impl From<InfraError> for PetSafeError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<PetSafeError> for InfraError {
    fn from(value: PetSafeError) -> Self {
        InfraError(value)
    }
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → PetSafeError */
/* -------------------------------------------------------------------------- */

impl From<SqlError> for InfraError {
    fn from(err: SqlError) -> Self {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        let domain = match err {
            RE::SqliteFailure(code, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match code.code {
                    ErrorCode::DatabaseBusy => PetSafeError::Database("database is busy".into()),
                    ErrorCode::DatabaseLocked => {
                        PetSafeError::Database("database is locked".into())
                    }
                    ErrorCode::ConstraintViolation => {
                        PetSafeError::Database(format!("constraint violation: {message}"))
                    }
                    _ => PetSafeError::Database(message),
                }
            }
            RE::QueryReturnedNoRows => PetSafeError::NotFound("query returned no rows".into()),
            other => PetSafeError::Database(other.to_string()),
        };

        InfraError(domain)
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → PetSafeError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(err: r2d2::Error) -> Self {
        InfraError(PetSafeError::Database(format!("connection pool error: {err}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → PetSafeError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(err: HttpError) -> Self {
        let domain = if err.is_timeout() {
            PetSafeError::Network("request timed out".into())
        } else if err.is_connect() {
            PetSafeError::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            PetSafeError::Internal(format!("response decode failed: {err}"))
        } else {
            PetSafeError::Network(err.to_string())
        };

        InfraError(domain)
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json::Error → PetSafeError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        InfraError(PetSafeError::InvalidInput(format!("serialization failed: {err}")))
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → PetSafeError */
/* -------------------------------------------------------------------------- */

impl From<std::io::Error> for InfraError {
    fn from(err: std::io::Error) -> Self {
        InfraError(PetSafeError::Internal(format!("io error: {err}")))
    }
}
