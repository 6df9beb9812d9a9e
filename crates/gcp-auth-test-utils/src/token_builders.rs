//! Builders for Google-shaped identity tokens.
//!
//! Tokens are signed with a [`TestSigningKey`] (EdDSA) so they verify against
//! the JWKS document served by a `wiremock` Google stand-in.

use crate::crypto_fixtures::TestSigningKey;
use crate::test_ids::TEST_AUDIENCE;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, Header};
use serde_json::{json, Value};

/// Builder for IAM (`signJwt`) and GCE (metadata server) identity tokens.
#[derive(Debug, Clone)]
pub struct GoogleTokenBuilder {
    sub: String,
    email: Option<String>,
    iss: Option<String>,
    aud: String,
    iat: i64,
    exp: i64,
    compute_engine: Option<Value>,
}

impl GoogleTokenBuilder {
    /// Token signed by a service account key; `sub` is the account email.
    pub fn iam(service_account: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: service_account.to_string(),
            email: None,
            iss: Some(service_account.to_string()),
            aud: TEST_AUDIENCE.to_string(),
            iat: now,
            exp: now + 900,
            compute_engine: None,
        }
    }

    /// GCE metadata-server token for an instance running as `service_account`.
    pub fn gce(service_account: &str, project_id: &str, zone: &str) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: "109876543210987654321".to_string(),
            email: Some(service_account.to_string()),
            iss: Some("https://accounts.google.com".to_string()),
            aud: TEST_AUDIENCE.to_string(),
            iat: now,
            exp: now + 3600,
            compute_engine: Some(json!({
                "project_id": project_id,
                "project_number": 123456789,
                "zone": zone,
                "instance_id": "4567890123456789",
                "instance_name": "ci-runner-1",
                "instance_creation_timestamp": now - 86_400,
            })),
        }
    }

    pub fn audience(mut self, aud: &str) -> Self {
        self.aud = aud.to_string();
        self
    }

    pub fn issuer(mut self, iss: &str) -> Self {
        self.iss = Some(iss.to_string());
        self
    }

    pub fn issued_at(mut self, iat: i64) -> Self {
        self.iat = iat;
        self
    }

    pub fn expires_at(mut self, exp: i64) -> Self {
        self.exp = exp;
        self
    }

    pub fn claims(&self) -> Value {
        let mut claims = json!({
            "sub": self.sub,
            "aud": self.aud,
            "iat": self.iat,
            "exp": self.exp,
        });
        if let Some(map) = claims.as_object_mut() {
            if let Some(iss) = &self.iss {
                map.insert("iss".to_string(), json!(iss));
            }
            if let Some(email) = &self.email {
                map.insert("email".to_string(), json!(email));
                map.insert("email_verified".to_string(), json!(true));
            }
            if let Some(gce) = &self.compute_engine {
                map.insert("google".to_string(), json!({ "compute_engine": gce }));
            }
        }
        claims
    }

    /// Sign with `key` as EdDSA, setting `kid` in the header.
    pub fn sign(&self, key: &TestSigningKey) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(key.kid.clone());
        encode(&header, &self.claims(), &key.encoding_key()).expect("test token should sign")
    }
}
