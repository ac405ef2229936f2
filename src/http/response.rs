//! JSON bodies for denied and failed requests.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::access::DenyReason;

/// Error payload returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Application error code
    pub code: u32,
    /// Human readable message
    pub msg: String,
}

impl DenyReason {
    /// Application error code reported to clients.
    pub fn code(&self) -> u32 {
        match self {
            DenyReason::SessionError => 500210,
            DenyReason::AccessLimitReached => 500104,
        }
    }

    /// Message reported to clients.
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::SessionError => "session does not exist or has expired",
            DenyReason::AccessLimitReached => "access limit reached, try again later",
        }
    }

    /// HTTP status used for the denial.
    pub fn status(&self) -> StatusCode {
        match self {
            DenyReason::SessionError => StatusCode::UNAUTHORIZED,
            DenyReason::AccessLimitReached => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Render a gate denial.
pub fn deny_response(reason: DenyReason) -> Response {
    let body = ErrorBody {
        code: reason.code(),
        msg: reason.message().to_string(),
    };
    (reason.status(), Json(body)).into_response()
}

impl IntoResponse for DenyReason {
    fn into_response(self) -> Response {
        deny_response(self)
    }
}
