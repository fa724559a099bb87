//! Meeting Hub error types.
//!
//! Every core operation fails with exactly one `HubError`. The `IntoResponse`
//! impl renders the uniform envelope with `success = false`. Internal-class
//! errors are logged server-side and reported to clients with a generic
//! message.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::envelope::ApiEnvelope;
use thiserror::Error;

/// Meeting Hub error type.
///
/// Maps to HTTP status codes:
/// - Validation: 400 Bad Request
/// - Unauthorized: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - NotFound: 404 Not Found
/// - Conflict: 409 Conflict
/// - Database, Crypto, Collaborator, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            HubError::Validation(_) => 400,
            HubError::Unauthorized(_) => 401,
            HubError::Forbidden(_) => 403,
            HubError::NotFound(_) => 404,
            HubError::Conflict(_) => 409,
            HubError::Database(_)
            | HubError::Crypto(_)
            | HubError::Collaborator(_)
            | HubError::Internal(_) => 500,
        }
    }

    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::Validation(_) => "validation",
            HubError::Unauthorized(_) => "unauthorized",
            HubError::Forbidden(_) => "forbidden",
            HubError::NotFound(_) => "not_found",
            HubError::Conflict(_) => "conflict",
            HubError::Database(_) => "database",
            HubError::Crypto(_) => "crypto",
            HubError::Collaborator(_) => "collaborator",
            HubError::Internal(_) => "internal",
        }
    }

    /// Message safe to return to clients.
    fn public_message(&self) -> String {
        match self {
            HubError::Validation(m)
            | HubError::Unauthorized(m)
            | HubError::Forbidden(m)
            | HubError::NotFound(m)
            | HubError::Conflict(m) => m.clone(),
            HubError::Database(_) => "An internal database error occurred".to_string(),
            HubError::Crypto(_) => "An internal cryptographic error occurred".to_string(),
            HubError::Collaborator(_) => "An upstream service failed".to_string(),
            HubError::Internal(_) => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        if code >= 500 {
            tracing::error!(target: "hub.errors", error = %self, kind = self.kind(), "Request failed");
        }

        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ApiEnvelope::failure(self.public_message(), code);
        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Bearer realm=\"meeting-hub\", error=\"invalid_token\""),
            );
        }

        response
    }
}

impl From<sqlx::Error> for HubError {
    fn from(err: sqlx::Error) -> Self {
        HubError::Database(err.to_string())
    }
}
