//! GCP auth service error types.
//!
//! Every error maps to an HTTP status via the `IntoResponse` impl. Login and
//! token failures return generic messages so a caller cannot learn which
//! check rejected it or what the configured allow-lists look like. The
//! specific reason is logged server-side. Configuration-management failures
//! return specific validation messages since the caller is an authenticated
//! administrator.

use crate::services::allow_list::AllowListField;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GcpAuthError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("GCP auth configuration not found")]
    ConfigurationNotFound,

    #[error("GCP auth configuration already exists for identity")]
    AlreadyExists,

    #[error("Request source IP is not trusted")]
    IpNotTrusted,

    #[error("Identity claim invalid: {0}")]
    ClaimInvalid(String),

    #[error("Identity claim does not match configured auth type")]
    ClaimTypeMismatch,

    #[error("Identity claim not authorized: {field} mismatch")]
    ClaimNotAuthorized { field: AllowListField },

    #[error("Access token expired")]
    Expired,

    #[error("Access token use limit reached")]
    Exhausted,

    #[error("Access token cannot be renewed past its max TTL")]
    MaxTTLExceeded,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Too many failed login attempts")]
    RateLimitExceeded,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error")]
    Internal,
}

impl GcpAuthError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            GcpAuthError::Database(_) | GcpAuthError::Internal => 500,
            GcpAuthError::ClaimInvalid(_)
            | GcpAuthError::ClaimTypeMismatch
            | GcpAuthError::Expired
            | GcpAuthError::Exhausted
            | GcpAuthError::InvalidToken(_) => 401,
            GcpAuthError::IpNotTrusted
            | GcpAuthError::ClaimNotAuthorized { .. }
            | GcpAuthError::Forbidden(_) => 403,
            GcpAuthError::ConfigurationNotFound | GcpAuthError::NotFound(_) => 404,
            GcpAuthError::AlreadyExists => 409,
            GcpAuthError::MaxTTLExceeded | GcpAuthError::ValidationError(_) => 400,
            GcpAuthError::RateLimitExceeded => 429,
            GcpAuthError::ServiceUnavailable(_) => 503,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for GcpAuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GcpAuthError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "gcp_auth.database", error = %err, "Database operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            GcpAuthError::ConfigurationNotFound => (
                StatusCode::NOT_FOUND,
                "CONFIGURATION_NOT_FOUND",
                "GCP auth configuration not found for identity".to_string(),
            ),
            GcpAuthError::AlreadyExists => (
                StatusCode::CONFLICT,
                "ALREADY_EXISTS",
                "GCP auth is already configured for this identity".to_string(),
            ),
            GcpAuthError::IpNotTrusted | GcpAuthError::ClaimNotAuthorized { .. } => (
                StatusCode::FORBIDDEN,
                "ACCESS_DENIED",
                "Access denied".to_string(),
            ),
            GcpAuthError::ClaimInvalid(_) | GcpAuthError::ClaimTypeMismatch => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_FAILED",
                "Authentication failed".to_string(),
            ),
            GcpAuthError::Expired => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "The access token has expired".to_string(),
            ),
            GcpAuthError::Exhausted => (
                StatusCode::UNAUTHORIZED,
                "TOKEN_USE_LIMIT_REACHED",
                "The access token has reached its use limit".to_string(),
            ),
            GcpAuthError::MaxTTLExceeded => (
                StatusCode::BAD_REQUEST,
                "MAX_TTL_EXCEEDED",
                "The access token cannot be renewed past its max TTL".to_string(),
            ),
            GcpAuthError::ValidationError(reason) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", reason.clone())
            }
            GcpAuthError::InvalidToken(reason) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", reason.clone())
            }
            GcpAuthError::Forbidden(reason) => (StatusCode::FORBIDDEN, "FORBIDDEN", reason.clone()),
            GcpAuthError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", resource.clone())
            }
            GcpAuthError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many requests. Please try again later.".to_string(),
            ),
            GcpAuthError::ServiceUnavailable(reason) => {
                tracing::warn!(target: "gcp_auth.availability", reason = %reason, "Service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Service temporarily unavailable".to_string(),
                )
            }
            GcpAuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<sqlx::Error> for GcpAuthError {
    fn from(err: sqlx::Error) -> Self {
        GcpAuthError::Database(err.to_string())
    }
}
