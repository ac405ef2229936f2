//! Error types for the access gate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::http::ErrorBody;

/// Main error type for access gate operations.
///
/// Access denials are not errors; they are reported as
/// [`Decision::Deny`](crate::access::Decision). These variants are faults that
/// escape the gate and reach the host framework.
#[derive(Error, Debug)]
pub enum AccessGateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The counter store could not be reached or returned garbage
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(String),

    /// Redis client errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Identity resolution failed.
    ///
    /// Return this from an [`IdentityResolver`](crate::identity::IdentityResolver)
    /// whose session backend cannot be reached; the middleware renders it as a 500.
    #[error("Identity resolution error: {0}")]
    Identity(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AccessGateError {
    /// Whether the fault came from the counter store.
    pub fn is_store_fault(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Redis(_))
    }

    fn status(&self) -> StatusCode {
        if self.is_store_fault() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AccessGateError {
    fn into_response(self) -> Response {
        let status = self.status();
        error!(error = %self, status = status.as_u16(), "Request failed in access gate");

        let body = ErrorBody {
            code: 500100,
            msg: "server error".to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for access gate operations.
pub type Result<T> = std::result::Result<T, AccessGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_faults_map_to_unavailable() {
        let err = AccessGateError::StoreUnavailable("connection refused".to_string());
        assert!(err.is_store_fault());
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_identity_fault_maps_to_internal_error() {
        let err = AccessGateError::Identity("session backend down".to_string());
        assert!(!err.is_store_fault());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
