//! Google identity token verifier.
//!
//! Handles the two token shapes GCP workloads can present:
//!
//! - `iam`: a JWT signed with a service account key via
//!   `projects.serviceAccounts.signJwt`. The signer is named in `sub`; its
//!   public keys are published at `{iam_jwks_base_url}/{email}`.
//! - `gce`: an identity token from the GCE metadata server, requested with
//!   `format=full`, signed by Google's OAuth2 keys and carrying a
//!   `google.compute_engine` claim.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The unverified `sub` only selects a key endpoint after a charset check
//! - Audience, and for GCE the issuer, are always validated
//! - `exp` and `iat` are checked against the injected clock
//! - Only RS256 (RSA) and EdDSA (Ed25519) keys are accepted

use crate::auth::claims::{project_from_service_account, RawGoogleClaims};
use crate::auth::jwks::{Jwk, JwksClient};
use crate::auth::{ClaimError, ClaimSource, ClaimVerifier, GcpIdentityClaims};
use crate::clock::Clock;
use crate::config::Config;
use crate::models::GcpAuthType;
use async_trait::async_trait;
use common::jwt::{
    decode_jwk_field, extract_kid, peek_claims, peek_header, validate_exp_at, validate_iat_at,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Issuers Google uses for metadata-server identity tokens.
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// Longest service account email accepted before key lookup.
const MAX_EMAIL_LENGTH: usize = 254;

/// Production [`ClaimVerifier`] backed by Google's JWKS endpoints.
pub struct GoogleClaimVerifier {
    jwks: Arc<JwksClient>,
    audience: String,
    iam_jwks_base_url: String,
    gce_jwks_url: String,
    clock: Arc<dyn Clock>,
    clock_skew: Duration,
}

impl GoogleClaimVerifier {
    pub fn new(
        jwks: Arc<JwksClient>,
        audience: String,
        iam_jwks_base_url: String,
        gce_jwks_url: String,
        clock: Arc<dyn Clock>,
        clock_skew: Duration,
    ) -> Self {
        Self {
            jwks,
            audience,
            iam_jwks_base_url,
            gce_jwks_url,
            clock,
            clock_skew,
        }
    }

    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(JwksClient::new(config.jwks_cache_ttl)),
            config.audience.clone(),
            config.iam_jwks_base_url.clone(),
            config.gce_jwks_url.clone(),
            clock,
            config.clock_skew(),
        )
    }

    /// Pick the key endpoint for a token, checking its shape first.
    fn jwks_url_for(
        &self,
        unverified: &RawGoogleClaims,
        expected: GcpAuthType,
    ) -> Result<String, ClaimError> {
        match (expected, unverified.compute_engine().is_some()) {
            (GcpAuthType::Iam, false) => {
                let email = unverified.sub.as_str();
                if !is_plausible_service_account(email) {
                    return Err(ClaimError::Invalid(
                        "sub is not a service account email".to_string(),
                    ));
                }
                Ok(format!("{}/{}", self.iam_jwks_base_url, email))
            }
            (GcpAuthType::Gce, true) => Ok(self.gce_jwks_url.clone()),
            _ => Err(ClaimError::TypeMismatch),
        }
    }
}

#[async_trait]
impl ClaimVerifier for GoogleClaimVerifier {
    #[instrument(skip_all, fields(auth_type = %expected))]
    async fn verify(
        &self,
        raw_token: &str,
        expected: GcpAuthType,
    ) -> Result<GcpIdentityClaims, ClaimError> {
        let header = peek_header(raw_token).map_err(|e| {
            tracing::debug!(target: "gcp_auth.verifier", error = ?e, "Token header rejected");
            ClaimError::Invalid("malformed token".to_string())
        })?;
        let kid = extract_kid(raw_token)
            .map_err(|_| ClaimError::Invalid("token has no key id".to_string()))?;
        let unverified: RawGoogleClaims = peek_claims(raw_token)
            .map_err(|_| ClaimError::Invalid("malformed token payload".to_string()))?;

        let url = self.jwks_url_for(&unverified, expected)?;
        let jwk = self.jwks.get_key(&url, &kid).await?;
        let (algorithm, decoding_key) = decoding_key_for(&jwk, &header.alg)?;

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.set_audience(&[self.audience.as_str()]);
        if expected == GcpAuthType::Gce {
            validation.set_issuer(&GOOGLE_ISSUERS);
        }

        let claims = decode::<RawGoogleClaims>(raw_token, &decoding_key, &validation)
            .map_err(|e| {
                tracing::debug!(target: "gcp_auth.verifier", error = %e, "Token verification failed");
                ClaimError::Invalid(e.to_string())
            })?
            .claims;

        let now = self.clock.now().timestamp();
        validate_exp_at(claims.exp, self.clock_skew, now)
            .map_err(|_| ClaimError::Invalid("token expired".to_string()))?;
        validate_iat_at(claims.iat, self.clock_skew, now)
            .map_err(|_| ClaimError::Invalid("token issued in the future".to_string()))?;

        let identity = match (expected, claims.compute_engine()) {
            (GcpAuthType::Iam, None) => GcpIdentityClaims {
                project_id: project_from_service_account(&claims.sub),
                service_account_email: claims.sub.clone(),
                zone: None,
                source: ClaimSource::Iam,
            },
            (GcpAuthType::Gce, Some(gce)) => {
                let email = claims.email.clone().ok_or_else(|| {
                    ClaimError::Invalid("identity token has no email claim".to_string())
                })?;
                GcpIdentityClaims {
                    service_account_email: email,
                    project_id: Some(gce.project_id.clone()),
                    zone: Some(gce.zone.clone()),
                    source: ClaimSource::Gce {
                        instance_id: gce.instance_id.clone(),
                        instance_name: gce.instance_name.clone(),
                    },
                }
            }
            _ => return Err(ClaimError::TypeMismatch),
        };

        tracing::debug!(target: "gcp_auth.verifier", "GCP identity token verified");
        Ok(identity)
    }
}

/// Build a decoding key for `jwk`, requiring it to match the token's `alg`.
fn decoding_key_for(jwk: &Jwk, token_alg: &str) -> Result<(Algorithm, DecodingKey), ClaimError> {
    if let Some(alg) = &jwk.alg {
        if alg != token_alg {
            tracing::warn!(target: "gcp_auth.verifier", jwk_alg = %alg, token_alg = %token_alg, "JWK algorithm does not match token");
            return Err(ClaimError::Invalid("key algorithm mismatch".to_string()));
        }
    }

    match (jwk.kty.as_str(), token_alg) {
        ("RSA", "RS256") => {
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                return Err(ClaimError::Invalid("RSA key missing components".to_string()));
            };
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|e| ClaimError::Invalid(format!("invalid RSA key: {}", e)))?;
            Ok((Algorithm::RS256, key))
        }
        ("OKP", "EdDSA") => {
            if jwk.crv.as_deref().is_some_and(|crv| crv != "Ed25519") {
                return Err(ClaimError::Invalid("unsupported curve".to_string()));
            }
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| ClaimError::Invalid("OKP key missing x".to_string()))?;
            let public_key = decode_jwk_field(x)
                .map_err(|e| ClaimError::Invalid(format!("invalid OKP key: {}", e)))?;
            Ok((Algorithm::EdDSA, DecodingKey::from_ed_der(&public_key)))
        }
        (kty, alg) => {
            tracing::warn!(target: "gcp_auth.verifier", kty = %kty, alg = %alg, "Unsupported key type or algorithm");
            Err(ClaimError::Invalid("unsupported key type".to_string()))
        }
    }
}

/// Charset and shape check before an unverified `sub` goes into a URL.
fn is_plausible_service_account(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_');
    !local.is_empty()
        && domain.contains('.')
        && local.chars().all(allowed)
        && domain.chars().all(allowed)
}
