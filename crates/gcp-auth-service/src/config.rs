//! GCP auth service configuration.
//!
//! Configuration is loaded from environment variables. The database URL and
//! the token signing seed are redacted in Debug output.

use base64::{engine::general_purpose, Engine as _};
use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default audience expected in GCP identity tokens.
pub const DEFAULT_AUDIENCE: &str = "https://gcp-auth.local";

/// Per-service-account JWKS endpoint used for IAM-signed JWTs.
pub const DEFAULT_IAM_JWKS_BASE_URL: &str = "https://www.googleapis.com/service_accounts/v1/jwk";

/// Google's OAuth2 signing certificates, used for GCE identity tokens.
pub const DEFAULT_GCE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Default JWKS cache lifetime in seconds.
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default request deadline in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Ed25519 seed length in bytes.
pub const SIGNING_SEED_LENGTH: usize = 32;

/// Behaviour when attaching GCP auth to an identity that already has it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttachPolicy {
    /// Replace the existing configuration in place.
    #[default]
    Overwrite,
    /// Fail with `AlreadyExists`.
    Reject,
}

impl FromStr for AttachPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(AttachPolicy::Overwrite),
            "reject" => Ok(AttachPolicy::Reject),
            other => Err(ConfigError::InvalidAttachPolicy(format!(
                "ATTACH_POLICY must be 'overwrite' or 'reject', got '{}'",
                other
            ))),
        }
    }
}

/// GCP auth service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Base64 Ed25519 seed for signing issued access tokens.
    pub signing_key_seed: SecretString,

    /// Audience GCP identity tokens must be minted for.
    pub audience: String,

    /// Base URL for per-service-account JWKS (`{base}/{email}`).
    pub iam_jwks_base_url: String,

    /// Google OAuth2 certificates URL.
    pub gce_jwks_url: String,

    /// How long fetched JWKS are cached.
    pub jwks_cache_ttl: Duration,

    /// JWT clock skew tolerance in seconds.
    pub jwt_clock_skew_seconds: i64,

    pub attach_policy: AttachPolicy,

    /// Take the request source IP from the first `X-Forwarded-For` entry.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,

    /// Per-request deadline.
    pub request_timeout: Duration,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("signing_key_seed", &"[REDACTED]")
            .field("audience", &self.audience)
            .field("iam_jwks_base_url", &self.iam_jwks_base_url)
            .field("gce_jwks_url", &self.gce_jwks_url)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("attach_policy", &self.attach_policy)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid signing key: {0}")]
    InvalidSigningKey(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid attach policy: {0}")]
    InvalidAttachPolicy(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidBool(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let seed_base64 = vars
            .get("GCP_AUTH_SIGNING_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("GCP_AUTH_SIGNING_KEY".to_string()))?;
        let signing_key_seed = validate_signing_seed(seed_base64)?;

        let audience = vars
            .get("GCP_AUTH_AUDIENCE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string());

        let iam_jwks_base_url = vars
            .get("GCP_IAM_JWKS_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_IAM_JWKS_BASE_URL.to_string());

        let gce_jwks_url = vars
            .get("GCP_GCE_JWKS_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_GCE_JWKS_URL.to_string());

        let jwks_cache_ttl = Duration::from_secs(parse_positive_secs(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
        )?);

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        let attach_policy = match vars.get("ATTACH_POLICY") {
            Some(value) => value.parse()?,
            None => AttachPolicy::default(),
        };

        let trust_forwarded_for = match vars.get("TRUST_FORWARDED_FOR") {
            Some(value) => parse_bool("TRUST_FORWARDED_FOR", value)?,
            None => false,
        };

        let request_timeout = Duration::from_secs(parse_positive_secs(
            vars,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?);

        Ok(Config {
            database_url,
            bind_address,
            signing_key_seed,
            audience,
            iam_jwks_base_url,
            gce_jwks_url,
            jwks_cache_ttl,
            jwt_clock_skew_seconds,
            attach_policy,
            trust_forwarded_for,
            request_timeout,
        })
    }

    /// Clock skew as a `Duration`.
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds.unsigned_abs())
    }
}

fn validate_signing_seed(seed_base64: &str) -> Result<SecretString, ConfigError> {
    let decoded = general_purpose::STANDARD
        .decode(seed_base64.trim())
        .map_err(|e| {
            ConfigError::InvalidSigningKey(format!("GCP_AUTH_SIGNING_KEY is not valid base64: {}", e))
        })?;

    if decoded.len() != SIGNING_SEED_LENGTH {
        return Err(ConfigError::InvalidSigningKey(format!(
            "GCP_AUTH_SIGNING_KEY must decode to {} bytes, got {}",
            SIGNING_SEED_LENGTH,
            decoded.len()
        )));
    }

    Ok(SecretString::from(seed_base64.trim().to_string()))
}

fn parse_positive_secs(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be greater than 0",
            name
        )));
    }

    Ok(value)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool(format!(
            "{} must be true or false, got '{}'",
            name, value
        ))),
    }
}

/// Decoded signing seed bytes. Length is checked at load time.
pub fn decode_signing_seed(seed: &SecretString) -> Result<Vec<u8>, ConfigError> {
    general_purpose::STANDARD
        .decode(seed.expose_secret())
        .map_err(|e| ConfigError::InvalidSigningKey(e.to_string()))
}
