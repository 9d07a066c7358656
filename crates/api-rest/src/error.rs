//! # API Error Types
//!
//! Maps [`StoreError`] kinds to HTTP status codes and a JSON error body. Server faults are
//! logged with their details and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bsfm_core::StoreError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VIRUS_FOUND").
    pub code: String,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    /// Malware detected; the message is the detector's signature.
    #[error("virus found: {0}")]
    VirusFound(String),

    #[error("{0}")]
    Forbidden(String),

    /// Message is logged but not returned to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::VirusFound(_) => (StatusCode::CONFLICT, "VIRUS_FOUND"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => Self::NotFound(m),
            StoreError::Conflict(m) => Self::Conflict(m),
            StoreError::InvalidInput(m) => Self::BadRequest(m),
            StoreError::Infected(signature) => Self::VirusFound(signature),
            StoreError::Forbidden(m) => Self::Forbidden(m),
            StoreError::ServerFault(m) => Self::Internal(m),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_status_codes() {
        let cases = [
            (StoreError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (StoreError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (StoreError::InvalidInput("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (StoreError::Infected("Sig".into()), StatusCode::CONFLICT, "VIRUS_FOUND"),
            (StoreError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (
                StoreError::ServerFault("disk".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            assert_eq!(ApiError::from(err).status_and_code(), (status, code));
        }
    }
}
