//! JWKS client for fetching and caching Google public keys.
//!
//! Keys are cached per endpoint URL: GCE tokens share Google's OAuth2
//! certificate set, while each service account publishes its own set at
//! `{iam_jwks_base_url}/{email}`.
//!
//! # Security
//!
//! - Cache entries expire after the configured TTL to pick up key rotations
//! - An unknown `kid` triggers one refresh before the token is rejected
//! - Fetch failures surface as `ClaimError::Unavailable`, never as a
//!   verification failure

use crate::auth::ClaimError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

/// HTTP timeout for JWKS fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// JSON Web Key from a JWKS endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Jwk {
    /// Key type ("RSA" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Curve name for OKP keys ("Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// OKP public key value (base64url encoded).
    #[serde(default)]
    pub x: Option<String>,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(default)]
    pub e: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

struct CachedJwks {
    keys: HashMap<String, Jwk>,
    expires_at: Instant,
}

/// JWKS client with a per-URL TTL cache.
pub struct JwksClient {
    http_client: reqwest::Client,
    cache: RwLock<HashMap<String, CachedJwks>>,
    cache_ttl: Duration,
}

impl JwksClient {
    /// Create a new JWKS client.
    pub fn new(cache_ttl: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "gcp_auth.verifier.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            http_client,
            cache: RwLock::new(HashMap::new()),
            cache_ttl,
        }
    }

    /// Get a JWK by key ID from the set published at `url`.
    ///
    /// # Errors
    ///
    /// - `ClaimError::Unavailable` if the set cannot be fetched
    /// - `ClaimError::Invalid` if the key ID is not in the set after a refresh
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, url: &str, kid: &str) -> Result<Jwk, ClaimError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(url) {
                if cached.expires_at > Instant::now() {
                    if let Some(key) = cached.keys.get(kid) {
                        tracing::debug!(target: "gcp_auth.verifier.jwks", "JWKS cache hit");
                        return Ok(key.clone());
                    }
                    tracing::debug!(target: "gcp_auth.verifier.jwks", "Key not in cached JWKS, refreshing");
                }
            }
        }

        let keys = self.refresh(url).await?;
        keys.get(kid).cloned().ok_or_else(|| {
            tracing::warn!(target: "gcp_auth.verifier.jwks", "Key not found in JWKS after refresh");
            ClaimError::Invalid("unknown signing key".to_string())
        })
    }

    /// Fetch the set at `url` and replace its cache entry.
    #[instrument(skip(self))]
    async fn refresh(&self, url: &str) -> Result<HashMap<String, Jwk>, ClaimError> {
        tracing::debug!(target: "gcp_auth.verifier.jwks", "Fetching JWKS");

        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "gcp_auth.verifier.jwks", error = %e, "Failed to fetch JWKS");
            ClaimError::Unavailable("Google key endpoint unreachable".to_string())
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "gcp_auth.verifier.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(ClaimError::Unavailable(format!(
                "Google key endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "gcp_auth.verifier.jwks", error = %e, "Failed to parse JWKS response");
            ClaimError::Unavailable("Google key endpoint returned invalid JWKS".to_string())
        })?;

        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(
            target: "gcp_auth.verifier.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        let mut cache = self.cache.write().await;
        cache.insert(
            url.to_string(),
            CachedJwks {
                keys: keys.clone(),
                expires_at: Instant::now() + self.cache_ttl,
            },
        );

        Ok(keys)
    }

    /// Drop every cached set.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}
