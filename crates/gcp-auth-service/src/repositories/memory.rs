//! In-process repository implementations.
//!
//! Used by unit tests and the test harness so the service and HTTP layers
//! can be exercised without PostgreSQL. Semantics mirror the PostgreSQL
//! implementations, including the conditional updates.

use crate::errors::GcpAuthError;
use crate::models::{AuditEvent, AuditEventType, Identity, IdentityGcpAuth, IssuedAccessToken};
use crate::repositories::{AccessTokenRepository, AuditSink, GcpAuthRepository, IdentityDirectory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// GCP auth configurations keyed by identity id.
#[derive(Default)]
pub struct MemoryGcpAuthRepository {
    configs: RwLock<HashMap<Uuid, IdentityGcpAuth>>,
}

impl MemoryGcpAuthRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GcpAuthRepository for MemoryGcpAuthRepository {
    async fn find_by_identity(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<IdentityGcpAuth>, GcpAuthError> {
        Ok(self.configs.read().await.get(&identity_id).cloned())
    }

    async fn insert(&self, config: &IdentityGcpAuth) -> Result<IdentityGcpAuth, GcpAuthError> {
        let mut configs = self.configs.write().await;
        if configs.contains_key(&config.identity_id) {
            return Err(GcpAuthError::AlreadyExists);
        }
        configs.insert(config.identity_id, config.clone());
        Ok(config.clone())
    }

    async fn upsert(&self, config: &IdentityGcpAuth) -> Result<IdentityGcpAuth, GcpAuthError> {
        let mut configs = self.configs.write().await;
        let stored = match configs.get(&config.identity_id) {
            Some(existing) => IdentityGcpAuth {
                id: existing.id,
                created_at: existing.created_at,
                ..config.clone()
            },
            None => config.clone(),
        };
        configs.insert(stored.identity_id, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        config: &IdentityGcpAuth,
    ) -> Result<Option<IdentityGcpAuth>, GcpAuthError> {
        let mut configs = self.configs.write().await;
        let Some(existing) = configs.get_mut(&config.identity_id) else {
            return Ok(None);
        };
        *existing = IdentityGcpAuth {
            id: existing.id,
            org_id: existing.org_id,
            created_at: existing.created_at,
            ..config.clone()
        };
        Ok(Some(existing.clone()))
    }
}

/// Issued access tokens keyed by token id.
#[derive(Default)]
pub struct MemoryAccessTokenRepository {
    tokens: RwLock<HashMap<Uuid, IssuedAccessToken>>,
}

impl MemoryAccessTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }
}

#[async_trait]
impl AccessTokenRepository for MemoryAccessTokenRepository {
    async fn create(&self, token: &IssuedAccessToken) -> Result<IssuedAccessToken, GcpAuthError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.id) {
            return Err(GcpAuthError::Database(
                "duplicate access token id".to_string(),
            ));
        }
        tokens.insert(token.id, token.clone());
        Ok(token.clone())
    }

    async fn find(&self, id: Uuid) -> Result<Option<IssuedAccessToken>, GcpAuthError> {
        Ok(self.tokens.read().await.get(&id).cloned())
    }

    async fn compare_and_set_uses(
        &self,
        id: Uuid,
        expected: Option<i64>,
        next: Option<i64>,
    ) -> Result<bool, GcpAuthError> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&id) {
            Some(token) if token.revoked_at.is_none() && token.uses_remaining == expected => {
                token.uses_remaining = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_renewal(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
        renewed_at: DateTime<Utc>,
    ) -> Result<bool, GcpAuthError> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&id) {
            Some(token) if token.revoked_at.is_none() => {
                token.expires_at = expires_at;
                token.last_renewed_at = renewed_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke(&self, id: Uuid, revoked_at: DateTime<Utc>) -> Result<bool, GcpAuthError> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(&id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(revoked_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Identity directory populated by the caller.
#[derive(Default)]
pub struct MemoryIdentityDirectory {
    identities: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryIdentityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: Identity) {
        self.identities.write().await.insert(identity.id, identity);
    }
}

#[async_trait]
impl IdentityDirectory for MemoryIdentityDirectory {
    async fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, GcpAuthError> {
        Ok(self.identities.read().await.get(&id).cloned())
    }
}

/// Audit sink that keeps events in memory and can be told to fail.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
    failing: AtomicBool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with a database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of every recorded event, oldest first.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<(), GcpAuthError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GcpAuthError::Database("audit sink unavailable".to_string()));
        }
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn count_failed_logins(
        &self,
        identity_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, GcpAuthError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GcpAuthError::Database("audit sink unavailable".to_string()));
        }
        let count = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| {
                e.identity_id == identity_id
                    && e.event_type == AuditEventType::LoginIdentityGcpAuth
                    && !e.success
                    && e.created_at >= since
            })
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }
}
