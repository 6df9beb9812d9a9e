//! Identity attributes extracted from a verified GCP token.

use serde::Deserialize;

/// Where a verified identity came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimSource {
    /// Service-account signed JWT.
    Iam,
    /// GCE metadata-server identity token.
    Gce {
        instance_id: String,
        instance_name: String,
    },
}

/// Attributes matched against a configuration's allow-lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpIdentityClaims {
    pub service_account_email: String,
    pub project_id: Option<String>,
    /// Only present for GCE tokens.
    pub zone: Option<String>,
    pub source: ClaimSource,
}

/// Payload of a Google-issued or service-account signed JWT.
///
/// Only the fields this service reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGoogleClaims {
    #[serde(default)]
    pub iss: Option<String>,
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub google: Option<GoogleExtension>,
}

/// The `google` claim on GCE identity tokens requested with `format=full`.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleExtension {
    #[serde(default)]
    pub compute_engine: Option<ComputeEngineClaims>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComputeEngineClaims {
    pub project_id: String,
    pub zone: String,
    pub instance_id: String,
    pub instance_name: String,
}

impl RawGoogleClaims {
    pub fn compute_engine(&self) -> Option<&ComputeEngineClaims> {
        self.google.as_ref()?.compute_engine.as_ref()
    }
}

/// Project id from a service account email (`name@PROJECT.iam.gserviceaccount.com`).
///
/// Returns `None` for Google-managed accounts outside a customer project.
pub fn project_from_service_account(email: &str) -> Option<String> {
    let (_, domain) = email.rsplit_once('@')?;
    let project = domain.strip_suffix(".iam.gserviceaccount.com")?;
    if project.is_empty() {
        None
    } else {
        Some(project.to_string())
    }
}
