//! Observability module for the GCP auth service
//!
//! # Privacy by Default
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit safe field allow-listing.
//! Fields are categorized as:
//! - **SAFE**: Can be logged in plaintext (enums, auth types, operation names)
//! - **HASHED**: Must be SHA-256 hashed for correlation (identity ids, service account emails)
//! - **NEVER**: Must never appear in logs (login JWTs, bearer tokens, signing seed)

pub mod metrics;

use crate::errors::GcpAuthError;
use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars)
///
/// This is a one-way hash for correlating log entries, not a secret-grade
/// digest.
pub fn hash_for_correlation(value: &str) -> String {
    let result = Sha256::digest(value.as_bytes());
    hex::encode(result.get(..4).unwrap_or_default())
}

/// Error categories for metrics labels (bounded cardinality)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Claim or bearer token rejected
    Authentication,
    /// Caller known but not allowed (IP, allow-list, permission)
    Authorization,
    /// Bad input or missing resource
    Client,
    /// Google key endpoints unreachable
    Upstream,
    /// Internal errors (database, system)
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Client => "client",
            ErrorCategory::Upstream => "upstream",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl From<&GcpAuthError> for ErrorCategory {
    fn from(err: &GcpAuthError) -> Self {
        match err {
            GcpAuthError::ClaimInvalid(_)
            | GcpAuthError::ClaimTypeMismatch
            | GcpAuthError::InvalidToken(_)
            | GcpAuthError::Expired
            | GcpAuthError::Exhausted
            | GcpAuthError::RateLimitExceeded => ErrorCategory::Authentication,
            GcpAuthError::IpNotTrusted
            | GcpAuthError::ClaimNotAuthorized { .. }
            | GcpAuthError::Forbidden(_) => ErrorCategory::Authorization,
            GcpAuthError::ConfigurationNotFound
            | GcpAuthError::AlreadyExists
            | GcpAuthError::MaxTTLExceeded
            | GcpAuthError::ValidationError(_)
            | GcpAuthError::NotFound(_) => ErrorCategory::Client,
            GcpAuthError::ServiceUnavailable(_) => ErrorCategory::Upstream,
            GcpAuthError::Database(_) | GcpAuthError::Internal => ErrorCategory::Internal,
        }
    }
}

/// Coarse failure reason recorded on audit events and login metrics.
///
/// Never more specific than what an operator needs; the allow-list field
/// that rejected a claim is only logged.
pub fn failure_reason(err: &GcpAuthError) -> &'static str {
    match err {
        GcpAuthError::ConfigurationNotFound => "configuration_not_found",
        GcpAuthError::IpNotTrusted => "ip_not_trusted",
        GcpAuthError::ClaimInvalid(_) => "claim_invalid",
        GcpAuthError::ClaimTypeMismatch => "claim_type_mismatch",
        GcpAuthError::ClaimNotAuthorized { .. } => "claim_not_authorized",
        GcpAuthError::Expired => "expired",
        GcpAuthError::Exhausted => "exhausted",
        GcpAuthError::MaxTTLExceeded => "max_ttl_exceeded",
        GcpAuthError::InvalidToken(_) => "invalid_token",
        GcpAuthError::RateLimitExceeded => "locked_out",
        GcpAuthError::ServiceUnavailable(_) => "upstream_unavailable",
        GcpAuthError::ValidationError(_) => "validation",
        GcpAuthError::Forbidden(_) => "forbidden",
        GcpAuthError::NotFound(_) => "not_found",
        GcpAuthError::AlreadyExists => "already_exists",
        GcpAuthError::Database(_) | GcpAuthError::Internal => "internal",
    }
}
