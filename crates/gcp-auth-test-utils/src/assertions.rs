//! Custom test assertions for expressive tests

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct JwtHeader {
    alg: String,
    #[serde(default)]
    kid: Option<String>,
}

fn decode_segment<T: for<'de> Deserialize<'de>>(token: &str, index: usize) -> T {
    let segment = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("JWT is missing segment {}", index));
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .expect("JWT segment should be base64url");
    serde_json::from_slice(&bytes).expect("JWT segment should be JSON")
}

/// Assertions for issued bearer tokens.
///
/// # Example
/// ```rust,ignore
/// token
///     .assert_valid_jwt()
///     .assert_signed_by(server.signing_key_id())
///     .assert_for_subject(&TEST_IDENTITY_CI.to_string());
/// ```
pub trait TokenAssertions {
    /// Three segments, EdDSA header.
    fn assert_valid_jwt(&self) -> &Self;

    fn assert_signed_by(&self, key_id: &str) -> &Self;

    fn assert_for_subject(&self, subject: &str) -> &Self;

    /// `auth_token_type` claim equals `expected` (camelCase form).
    fn assert_token_type(&self, expected: &str) -> &Self;

    /// `exp - iat` equals `seconds`.
    fn assert_horizon(&self, seconds: i64) -> &Self;
}

impl TokenAssertions for String {
    fn assert_valid_jwt(&self) -> &Self {
        let parts = self.split('.').count();
        assert_eq!(parts, 3, "JWT must have 3 parts, got {}", parts);
        let header: JwtHeader = decode_segment(self, 0);
        assert_eq!(header.alg, "EdDSA", "Expected EdDSA algorithm");
        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header: JwtHeader = decode_segment(self, 0);
        assert_eq!(header.kid.as_deref(), Some(key_id), "Unexpected signing key");
        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        let claims: Value = decode_segment(self, 1);
        assert_eq!(claims["sub"], subject, "Unexpected token subject");
        self
    }

    fn assert_token_type(&self, expected: &str) -> &Self {
        let claims: Value = decode_segment(self, 1);
        assert_eq!(claims["auth_token_type"], expected, "Unexpected token type");
        self
    }

    fn assert_horizon(&self, seconds: i64) -> &Self {
        let claims: Value = decode_segment(self, 1);
        let exp = claims["exp"].as_i64().expect("exp should be an integer");
        let iat = claims["iat"].as_i64().expect("iat should be an integer");
        assert_eq!(exp - iat, seconds, "Unexpected token horizon");
        self
    }
}

/// Assertions for `{error:{code,message}}` response bodies.
pub trait ErrorBodyAssertions {
    fn assert_error_code(&self, code: &str) -> &Self;

    /// The message must not mention `needle` (e.g. an allow-list field name).
    fn assert_message_excludes(&self, needle: &str) -> &Self;
}

impl ErrorBodyAssertions for Value {
    fn assert_error_code(&self, code: &str) -> &Self {
        assert_eq!(self["error"]["code"], code, "Unexpected error body: {}", self);
        self
    }

    fn assert_message_excludes(&self, needle: &str) -> &Self {
        let message = self["error"]["message"]
            .as_str()
            .expect("error body should carry a message");
        assert!(
            !message.to_lowercase().contains(&needle.to_lowercase()),
            "Error message leaks '{}': {}",
            needle,
            message
        );
        self
    }
}
