//! GCP identity token verification.
//!
//! The login flow depends only on the [`ClaimVerifier`] trait. The production
//! implementation is [`google::GoogleClaimVerifier`]; tests use
//! [`mock::MockClaimVerifier`].

pub mod claims;
pub mod google;
pub mod jwks;

use crate::errors::GcpAuthError;
use crate::models::GcpAuthType;
use async_trait::async_trait;
pub use claims::{ClaimSource, GcpIdentityClaims};
use thiserror::Error;

/// Why a claim was not accepted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClaimError {
    /// Bad signature, expired, wrong audience or malformed.
    #[error("Claim invalid: {0}")]
    Invalid(String),

    /// Token shape does not match the configured auth type.
    #[error("Claim type does not match configured auth type")]
    TypeMismatch,

    /// The trust anchor (JWKS endpoint) could not be reached.
    #[error("Claim verification unavailable: {0}")]
    Unavailable(String),
}

impl From<ClaimError> for GcpAuthError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::Invalid(reason) => GcpAuthError::ClaimInvalid(reason),
            ClaimError::TypeMismatch => GcpAuthError::ClaimTypeMismatch,
            ClaimError::Unavailable(reason) => GcpAuthError::ServiceUnavailable(reason),
        }
    }
}

/// Verifies a cloud-provider signed identity token.
#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    /// Verify `raw_token` and extract identity attributes.
    ///
    /// `expected` is the configured auth type; a token of the other shape is
    /// `ClaimError::TypeMismatch`.
    async fn verify(
        &self,
        raw_token: &str,
        expected: GcpAuthType,
    ) -> Result<GcpIdentityClaims, ClaimError>;
}

/// Mock verifier for testing.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock claim verifier.
    ///
    /// Returns the configured outcome for every call. A configured identity
    /// whose source does not match the expected auth type yields
    /// `TypeMismatch`, like the real verifier.
    pub struct MockClaimVerifier {
        outcome: Mutex<Result<GcpIdentityClaims, ClaimError>>,
        call_count: AtomicUsize,
    }

    impl MockClaimVerifier {
        /// Create a mock that accepts every token as `claims`.
        pub fn accepting(claims: GcpIdentityClaims) -> Self {
            Self {
                outcome: Mutex::new(Ok(claims)),
                call_count: AtomicUsize::new(0),
            }
        }

        /// Create a mock that rejects every token with `err`.
        pub fn rejecting(err: ClaimError) -> Self {
            Self {
                outcome: Mutex::new(Err(err)),
                call_count: AtomicUsize::new(0),
            }
        }

        /// Replace the identity returned by subsequent calls.
        pub fn set_claims(&self, claims: GcpIdentityClaims) {
            *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Ok(claims);
        }

        /// Make subsequent calls fail with `err`.
        pub fn set_error(&self, err: ClaimError) {
            *self.outcome.lock().unwrap_or_else(|e| e.into_inner()) = Err(err);
        }

        /// Get the number of calls made.
        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ClaimVerifier for MockClaimVerifier {
        async fn verify(
            &self,
            _raw_token: &str,
            expected: GcpAuthType,
        ) -> Result<GcpIdentityClaims, ClaimError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcome
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();

            let claims = outcome?;
            let matches_type = matches!(
                (&claims.source, expected),
                (ClaimSource::Iam, GcpAuthType::Iam) | (ClaimSource::Gce { .. }, GcpAuthType::Gce)
            );
            if !matches_type {
                return Err(ClaimError::TypeMismatch);
            }
            Ok(claims)
        }
    }
}
