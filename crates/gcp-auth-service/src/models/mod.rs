use crate::errors::GcpAuthError;
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use uuid::Uuid;

/// Default access token TTL and max TTL: 30 days.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 2_592_000;

/// Upper bound for `accessTokenMaxTTL`: 10 years.
pub const MAX_ACCESS_TOKEN_TTL_SECONDS: i64 = 315_360_000;

/// Which GCP claim shape a configuration expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcpAuthType {
    /// JWT signed by a service account key (`projects.serviceAccounts.signJwt`).
    Iam,
    /// Google-signed identity token from the GCE metadata server.
    Gce,
}

impl GcpAuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GcpAuthType::Iam => "iam",
            GcpAuthType::Gce => "gce",
        }
    }
}

impl fmt::Display for GcpAuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GcpAuthType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "iam" => Ok(GcpAuthType::Iam),
            "gce" => Ok(GcpAuthType::Gce),
            _ => Err(format!("Invalid GCP auth type: {}", s)),
        }
    }
}

/// A trusted source range, serialized as `{"ipAddress": "10.0.0.0/8"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedIp {
    pub ip_address: IpNet,
}

impl TrustedIp {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.ip_address.contains(ip)
    }
}

/// GCP auth configuration attached to a machine identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityGcpAuth {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub org_id: Uuid,
    #[serde(rename = "type")]
    pub auth_type: GcpAuthType,
    pub allowed_service_accounts: String,
    pub allowed_projects: String,
    pub allowed_zones: String,
    pub access_token_trusted_ips: Vec<TrustedIp>,
    #[serde(rename = "accessTokenTTL")]
    pub access_token_ttl: i64,
    #[serde(rename = "accessTokenMaxTTL")]
    pub access_token_max_ttl: i64,
    pub access_token_num_uses_limit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape of `identity_gcp_auths`.
#[derive(Debug, Clone, FromRow)]
pub struct IdentityGcpAuthRow {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub org_id: Uuid,
    pub auth_type: String,
    pub allowed_service_accounts: String,
    pub allowed_projects: String,
    pub allowed_zones: String,
    pub access_token_trusted_ips: Vec<String>,
    pub access_token_ttl: i64,
    pub access_token_max_ttl: i64,
    pub access_token_num_uses_limit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<IdentityGcpAuthRow> for IdentityGcpAuth {
    type Error = GcpAuthError;

    fn try_from(row: IdentityGcpAuthRow) -> Result<Self, Self::Error> {
        let auth_type = GcpAuthType::from_str(&row.auth_type).map_err(GcpAuthError::Database)?;
        let access_token_trusted_ips = row
            .access_token_trusted_ips
            .iter()
            .map(|cidr| {
                cidr.parse::<IpNet>()
                    .map(|ip_address| TrustedIp { ip_address })
                    .map_err(|e| {
                        GcpAuthError::Database(format!("Stored trusted IP '{}' invalid: {}", cidr, e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IdentityGcpAuth {
            id: row.id,
            identity_id: row.identity_id,
            org_id: row.org_id,
            auth_type,
            allowed_service_accounts: row.allowed_service_accounts,
            allowed_projects: row.allowed_projects,
            allowed_zones: row.allowed_zones,
            access_token_trusted_ips,
            access_token_ttl: row.access_token_ttl,
            access_token_max_ttl: row.access_token_max_ttl,
            access_token_num_uses_limit: row.access_token_num_uses_limit,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Access token issued by a GCP auth login (maps to identity_access_tokens table).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct IssuedAccessToken {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub configuration_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub last_renewed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Hard ceiling fixed at issue (`issued_at + max_ttl`); matches the bearer's `exp`.
    pub max_expires_at: DateTime<Utc>,
    /// `None` means unlimited uses.
    pub uses_remaining: Option<i64>,
    pub source_ip: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Machine identity as seen by this service (maps to identities table).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Identity {
    pub id: Uuid,
    pub org_id: Uuid,
    pub name: String,
}

/// Kind of principal making a configuration-management request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActorType {
    User,
    Identity,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Identity => "identity",
        }
    }
}

/// How the actor authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActorAuthMethod {
    /// Platform user session JWT.
    UserSession,
    /// Identity access token from a GCP auth login.
    GcpAuth,
}

/// Authorization context forwarded to the permission checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorContext {
    pub actor: ActorType,
    pub actor_id: Uuid,
    pub actor_org_id: Uuid,
    pub actor_auth_method: ActorAuthMethod,
}

/// Request metadata recorded with audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub ip_address: Option<IpAddr>,
    pub user_agent: Option<String>,
}

/// Audit event types emitted by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEventType {
    LoginIdentityGcpAuth,
    AddIdentityGcpAuth,
    UpdateIdentityGcpAuth,
    GetIdentityGcpAuth,
    RenewIdentityAccessToken,
    RevokeIdentityAccessToken,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::LoginIdentityGcpAuth => "login-identity-gcp-auth",
            AuditEventType::AddIdentityGcpAuth => "add-identity-gcp-auth",
            AuditEventType::UpdateIdentityGcpAuth => "update-identity-gcp-auth",
            AuditEventType::GetIdentityGcpAuth => "get-identity-gcp-auth",
            AuditEventType::RenewIdentityAccessToken => "renew-identity-access-token",
            AuditEventType::RevokeIdentityAccessToken => "revoke-identity-access-token",
        }
    }
}

/// Audit record handed to the audit sink.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    pub org_id: Option<Uuid>,
    pub identity_id: Uuid,
    pub actor: Option<ActorContext>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Auth event row (maps to audit_events table)
#[derive(Debug, Clone, FromRow)]
pub struct AuditEventRow {
    pub event_id: Uuid,
    pub event_type: String,
    pub org_id: Option<Uuid>,
    pub identity_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub success: bool,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

fn default_trusted_ips() -> Vec<TrustedIpInput> {
    vec![
        TrustedIpInput {
            ip_address: "0.0.0.0/0".to_string(),
        },
        TrustedIpInput {
            ip_address: "::/0".to_string(),
        },
    ]
}

fn default_ttl() -> i64 {
    DEFAULT_ACCESS_TOKEN_TTL_SECONDS
}

/// Trusted IP as submitted by a client; validated into [`TrustedIp`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedIpInput {
    pub ip_address: String,
}

/// Body of `POST /gcp-auth/identities/{identityId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachGcpAuthRequest {
    #[serde(rename = "type")]
    pub auth_type: GcpAuthType,
    #[serde(default)]
    pub allowed_service_accounts: String,
    #[serde(default)]
    pub allowed_projects: String,
    #[serde(default)]
    pub allowed_zones: String,
    #[serde(default = "default_trusted_ips")]
    pub access_token_trusted_ips: Vec<TrustedIpInput>,
    #[serde(default = "default_ttl", rename = "accessTokenTTL")]
    pub access_token_ttl: i64,
    #[serde(default = "default_ttl", rename = "accessTokenMaxTTL")]
    pub access_token_max_ttl: i64,
    #[serde(default)]
    pub access_token_num_uses_limit: i64,
}

/// Body of `PATCH /gcp-auth/identities/{identityId}`; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGcpAuthRequest {
    #[serde(default, rename = "type")]
    pub auth_type: Option<GcpAuthType>,
    #[serde(default)]
    pub allowed_service_accounts: Option<String>,
    #[serde(default)]
    pub allowed_projects: Option<String>,
    #[serde(default)]
    pub allowed_zones: Option<String>,
    #[serde(default)]
    pub access_token_trusted_ips: Option<Vec<TrustedIpInput>>,
    #[serde(default, rename = "accessTokenTTL")]
    pub access_token_ttl: Option<i64>,
    #[serde(default, rename = "accessTokenMaxTTL")]
    pub access_token_max_ttl: Option<i64>,
    #[serde(default)]
    pub access_token_num_uses_limit: Option<i64>,
}

/// Body of `POST /gcp-auth/login`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub identity_id: Uuid,
    pub jwt: SecretString,
}

/// Body of the token renew/revoke endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRequest {
    pub access_token: SecretString,
}

/// Bearer token response for login and renewal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(rename = "accessTokenMaxTTL")]
    pub access_token_max_ttl: i64,
}

/// Configuration response envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpAuthResponse {
    pub identity_gcp_auth: IdentityGcpAuth,
}

/// Revocation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub message: String,
}
