//! Signing and verification of issued bearer tokens.
//!
//! Tokens are EdDSA (Ed25519) JWTs. The `exp` claim carries the absolute
//! horizon (`issuedAt + accessTokenMaxTTL`); the effective TTL and use count
//! live in storage and are enforced by the token lifecycle, so a signature
//! check alone never makes a token usable.

use crate::errors::GcpAuthError;
use chrono::{DateTime, Utc};
use common::jwt::{peek_header, validate_exp_at, validate_iat_at, JwtValidationError};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

/// Kind of principal a bearer token represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthTokenType {
    /// Issued by a GCP auth login; backed by a stored access token.
    IdentityAccessToken,
    /// Platform user session.
    User,
}

/// Claims carried by tokens this service signs and accepts.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    /// Identity id (or user id for session tokens).
    pub sub: String,
    /// Stored access token id.
    pub jti: String,
    pub org_id: Uuid,
    pub auth_token_type: AuthTokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Custom Debug implementation that redacts the `sub` and `jti` fields.
impl fmt::Debug for AccessTokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessTokenClaims")
            .field("sub", &"[REDACTED]")
            .field("jti", &"[REDACTED]")
            .field("org_id", &self.org_id)
            .field("auth_token_type", &self.auth_token_type)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .finish()
    }
}

/// Ed25519 token signer.
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    key_id: String,
    clock_skew: Duration,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner")
            .field("key_id", &self.key_id)
            .field("clock_skew", &self.clock_skew)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Build a signer from a 32-byte Ed25519 seed.
    ///
    /// # Errors
    ///
    /// Returns `GcpAuthError::Internal` if the seed is not a valid Ed25519 seed.
    pub fn from_seed(seed: &[u8], clock_skew: Duration) -> Result<Self, GcpAuthError> {
        let key_pair = Ed25519KeyPair::from_seed_unchecked(seed).map_err(|e| {
            tracing::error!(target: "gcp_auth.crypto", error = %e, "Invalid signing seed");
            GcpAuthError::Internal
        })?;
        let public_key = key_pair.public_key().as_ref();

        let pkcs8 = pkcs8_v1_from_seed(seed);
        let encoding_key = EncodingKey::from_ed_der(&pkcs8);
        let decoding_key = DecodingKey::from_ed_der(public_key);

        let digest = Sha256::digest(public_key);
        let key_id = hex::encode(digest.get(..8).unwrap_or_default());

        Ok(Self {
            encoding_key,
            decoding_key,
            key_id,
            clock_skew,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Sign a set of claims.
    #[instrument(skip_all)]
    pub fn sign(&self, claims: &AccessTokenClaims) -> Result<String, GcpAuthError> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.key_id.clone());

        encode(&header, claims, &self.encoding_key).map_err(|e| {
            tracing::error!(target: "gcp_auth.crypto", error = %e, "JWT signing operation failed");
            GcpAuthError::Internal
        })
    }

    /// Verify a token's signature and time claims against `now`.
    ///
    /// # Errors
    ///
    /// - `GcpAuthError::Expired` once `now` passes `exp`
    /// - `GcpAuthError::InvalidToken` for anything else
    #[instrument(skip_all)]
    pub fn verify(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, GcpAuthError> {
        // Size and structure are checked before any cryptographic work.
        let header = peek_header(token).map_err(|_| invalid_token())?;
        if header.alg != "EdDSA" {
            tracing::debug!(target: "gcp_auth.crypto", alg = %header.alg, "Unexpected token algorithm");
            return Err(invalid_token());
        }

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(target: "gcp_auth.crypto", error = %e, "Token verification failed");
                invalid_token()
            })?
            .claims;

        let now = now.timestamp();
        validate_iat_at(claims.iat, self.clock_skew, now).map_err(|_| invalid_token())?;
        validate_exp_at(claims.exp, Duration::ZERO, now).map_err(|e| match e {
            JwtValidationError::Expired => GcpAuthError::Expired,
            _ => invalid_token(),
        })?;

        Ok(claims)
    }
}

fn invalid_token() -> GcpAuthError {
    GcpAuthError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
}

/// Wrap a raw Ed25519 seed in a PKCS#8 v1 document (RFC 8410).
fn pkcs8_v1_from_seed(seed: &[u8]) -> Vec<u8> {
    // SEQUENCE { INTEGER 0, SEQUENCE { OID 1.3.101.112 }, OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = Vec::with_capacity(48);
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}
