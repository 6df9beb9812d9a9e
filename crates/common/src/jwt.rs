//! JWT utilities shared by the GCP auth crates.
//!
//! This module provides the pre-verification helpers every JWT path needs:
//! - Size limits for DoS prevention
//! - Clock skew constants for `iat` validation
//! - Header inspection (`kid`, `alg`) without verifying the signature
//! - Unverified payload peeking (e.g. to learn which service account's keys
//!   must be fetched before a signature can be checked)
//! - Time-claim validation against an explicit `now`
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned by the `peek_*` functions is trusted; callers MUST verify
//!   the signature before acting on claim values
//! - Error messages are intentionally generic to prevent information leakage

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Google identity tokens are roughly 1KB; service-account signed JWTs are
/// smaller. Anything above 8KB is rejected before base64 decoding or any
/// cryptographic work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default JWT clock skew tolerance (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during JWT pre-validation.
///
/// All variants render the same message so that callers which forward the
/// `Display` output do not reveal which check failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The token is invalid or expired")]
    MalformedToken,

    /// Token is missing required `kid` header.
    #[error("The token is invalid or expired")]
    MissingKid,

    /// Token `iat` claim is too far in the future.
    #[error("The token is invalid or expired")]
    IatTooFarInFuture,

    /// Token `exp` claim is in the past.
    #[error("The token is invalid or expired")]
    Expired,
}

/// The subset of a JWT header needed for key selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct JwtHeader {
    /// Signing algorithm (`RS256`, `EdDSA`, ...).
    pub alg: String,

    /// Key ID, when present.
    #[serde(default)]
    pub kid: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Split a token into its three segments after the size check.
fn split_token(token: &str) -> Result<(&str, &str, &str), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() =>
        {
            Ok((header, payload, signature))
        }
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, JwtValidationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT segment base64");
        JwtValidationError::MalformedToken
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT segment JSON");
        JwtValidationError::MalformedToken
    })
}

/// Decode the JWT header without verifying the signature.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - wrong structure, bad base64 or invalid JSON
pub fn peek_header(token: &str) -> Result<JwtHeader, JwtValidationError> {
    let (header, _, _) = split_token(token)?;
    decode_segment(header)
}

/// Extract the `kid` (key ID) from a JWT header without verifying the signature.
///
/// The `kid` value must only be used for key lookup in a trusted key set.
///
/// # Errors
///
/// As [`peek_header`], plus `MissingKid` when the header has no non-empty `kid`.
pub fn extract_kid(token: &str) -> Result<String, JwtValidationError> {
    peek_header(token)?
        .kid
        .filter(|kid| !kid.is_empty())
        .ok_or(JwtValidationError::MissingKid)
}

/// Decode the JWT payload into `T` without verifying the signature.
///
/// Used when the verification key depends on a claim (a service-account
/// signed JWT names its signer in `sub`). The result is untrusted.
///
/// # Errors
///
/// As [`peek_header`].
pub fn peek_claims<T: DeserializeOwned>(token: &str) -> Result<T, JwtValidationError> {
    let (_, payload, _) = split_token(token)?;
    decode_segment(payload)
}

/// Validate the `iat` (issued-at) claim against an explicit `now`.
///
/// Rejects tokens issued more than `clock_skew` in the future.
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` on violation.
pub fn validate_iat_at(iat: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    let max_iat = now.saturating_add(skew_secs(clock_skew));

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

/// Validate the `exp` (expiry) claim against an explicit `now`.
///
/// A token is accepted up to `clock_skew` after its expiry.
///
/// # Errors
///
/// Returns `JwtValidationError::Expired` on violation.
pub fn validate_exp_at(exp: i64, clock_skew: Duration, now: i64) -> Result<(), JwtValidationError> {
    if now > exp.saturating_add(skew_secs(clock_skew)) {
        tracing::debug!(
            target: "common.jwt",
            exp = exp,
            now = now,
            "Token rejected: expired"
        );
        return Err(JwtValidationError::Expired);
    }

    Ok(())
}

fn skew_secs(clock_skew: Duration) -> i64 {
    // Bounded by MAX_CLOCK_SKEW at config load; saturate for anything larger.
    i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX)
}

/// Decode a base64url (unpadded) JWK field such as `x`, `n` or `e`.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the content cannot be decoded.
pub fn decode_jwk_field(value_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value_b64url)
}
