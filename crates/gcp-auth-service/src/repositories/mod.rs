//! Repository layer for the GCP auth service.
//!
//! The service depends on the traits below. PostgreSQL implementations live
//! in the per-table modules; [`memory`] holds in-process implementations
//! used by tests and the test harness.

pub mod access_tokens;
pub mod audit_events;
pub mod gcp_auths;
pub mod identities;
pub mod memory;

use crate::errors::GcpAuthError;
use crate::models::{AuditEvent, Identity, IdentityGcpAuth, IssuedAccessToken};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use access_tokens::PgAccessTokenRepository;
pub use audit_events::PgAuditSink;
pub use gcp_auths::PgGcpAuthRepository;
pub use identities::PgIdentityDirectory;

/// Storage for per-identity GCP auth configurations.
#[async_trait]
pub trait GcpAuthRepository: Send + Sync {
    async fn find_by_identity(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<IdentityGcpAuth>, GcpAuthError>;

    /// Insert a new configuration.
    ///
    /// Fails with `GcpAuthError::AlreadyExists` if the identity already has one.
    async fn insert(&self, config: &IdentityGcpAuth) -> Result<IdentityGcpAuth, GcpAuthError>;

    /// Insert, or fully overwrite the existing configuration in one step.
    ///
    /// An overwrite keeps the existing row's `id` and `created_at`.
    async fn upsert(&self, config: &IdentityGcpAuth) -> Result<IdentityGcpAuth, GcpAuthError>;

    /// Replace every mutable field of an existing configuration.
    ///
    /// Returns `None` if the identity has no configuration.
    async fn update(
        &self,
        config: &IdentityGcpAuth,
    ) -> Result<Option<IdentityGcpAuth>, GcpAuthError>;
}

/// Storage for issued access tokens.
#[async_trait]
pub trait AccessTokenRepository: Send + Sync {
    async fn create(&self, token: &IssuedAccessToken) -> Result<IssuedAccessToken, GcpAuthError>;

    async fn find(&self, id: Uuid) -> Result<Option<IssuedAccessToken>, GcpAuthError>;

    /// Set `uses_remaining` to `next` only if it currently equals `expected`.
    ///
    /// Returns whether the swap happened.
    async fn compare_and_set_uses(
        &self,
        id: Uuid,
        expected: Option<i64>,
        next: Option<i64>,
    ) -> Result<bool, GcpAuthError>;

    /// Record a renewal on a token that has not been revoked.
    ///
    /// Returns whether a row was updated.
    async fn record_renewal(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
        renewed_at: DateTime<Utc>,
    ) -> Result<bool, GcpAuthError>;

    /// Mark a token revoked. Returns false if it was unknown or already revoked.
    async fn revoke(&self, id: Uuid, revoked_at: DateTime<Utc>) -> Result<bool, GcpAuthError>;
}

/// Lookup of machine identities and their owning organization.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, GcpAuthError>;
}

/// Append-only audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(), GcpAuthError>;

    /// Failed login attempts recorded for an identity at or after `since`.
    async fn count_failed_logins(
        &self,
        identity_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, GcpAuthError>;
}

/// Map a query result to its metrics status label.
pub(crate) fn query_status<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "error"
    }
}
