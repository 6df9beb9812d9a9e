//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across the GCP auth crates. Wrap
//! every sensitive value in one of these:
//!
//! - `SecretString` for the raw GCP identity JWT a workload presents at login,
//!   issued bearer access tokens, and base64-encoded key material read from
//!   the environment
//! - `SecretBox<Vec<u8>>` for decoded binary keys (the token signing seed)
//!
//! `Debug` on both types prints a redaction marker, so deriving `Debug` on a
//! request struct that holds a secret is safe to log through `tracing`.
//! Secrets are zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct LoginBody {
//!     identity_id: String,
//!     jwt: SecretString,
//! }
//!
//! let body: LoginBody =
//!     serde_json::from_str(r#"{"identity_id": "id-1", "jwt": "eyJhbGciOi"}"#).unwrap();
//! assert!(!format!("{body:?}").contains("eyJhbGciOi"));
//! assert_eq!(body.jwt.expose_secret(), "eyJhbGciOi");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
