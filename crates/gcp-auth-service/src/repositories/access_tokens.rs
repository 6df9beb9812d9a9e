//! Issued access token repository (identity_access_tokens table).
//!
//! Use-count decrements go through [`AccessTokenRepository::compare_and_set_uses`]
//! so concurrent consumers of the same token never both succeed on the last use.

use crate::errors::GcpAuthError;
use crate::models::IssuedAccessToken;
use crate::observability::metrics;
use crate::repositories::{query_status, AccessTokenRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const TABLE: &str = "identity_access_tokens";

/// PostgreSQL-backed [`AccessTokenRepository`].
#[derive(Clone)]
pub struct PgAccessTokenRepository {
    pool: PgPool,
}

impl PgAccessTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessTokenRepository for PgAccessTokenRepository {
    #[instrument(skip_all)]
    async fn create(&self, token: &IssuedAccessToken) -> Result<IssuedAccessToken, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, IssuedAccessToken>(
            r#"
            INSERT INTO identity_access_tokens (
                id, identity_id, configuration_id, issued_at, last_renewed_at,
                expires_at, max_expires_at, uses_remaining, source_ip, revoked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, identity_id, configuration_id, issued_at, last_renewed_at,
                      expires_at, max_expires_at, uses_remaining, source_ip, revoked_at
            "#,
        )
        .bind(token.id)
        .bind(token.identity_id)
        .bind(token.configuration_id)
        .bind(token.issued_at)
        .bind(token.last_renewed_at)
        .bind(token.expires_at)
        .bind(token.max_expires_at)
        .bind(token.uses_remaining)
        .bind(&token.source_ip)
        .bind(token.revoked_at)
        .fetch_one(&self.pool)
        .await;
        metrics::record_db_query("insert", TABLE, query_status(&result), start.elapsed());

        result.map_err(|e| GcpAuthError::Database(format!("Failed to store access token: {}", e)))
    }

    #[instrument(skip_all)]
    async fn find(&self, id: Uuid) -> Result<Option<IssuedAccessToken>, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, IssuedAccessToken>(
            r#"
            SELECT id, identity_id, configuration_id, issued_at, last_renewed_at,
                   expires_at, max_expires_at, uses_remaining, source_ip, revoked_at
            FROM identity_access_tokens
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        metrics::record_db_query("select", TABLE, query_status(&result), start.elapsed());

        result.map_err(|e| GcpAuthError::Database(format!("Failed to fetch access token: {}", e)))
    }

    #[instrument(skip_all)]
    async fn compare_and_set_uses(
        &self,
        id: Uuid,
        expected: Option<i64>,
        next: Option<i64>,
    ) -> Result<bool, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE identity_access_tokens
            SET uses_remaining = $3
            WHERE id = $1
              AND uses_remaining IS NOT DISTINCT FROM $2
              AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await;
        metrics::record_db_query("update", TABLE, query_status(&result), start.elapsed());

        let done = result.map_err(|e| {
            GcpAuthError::Database(format!("Failed to update access token uses: {}", e))
        })?;
        Ok(done.rows_affected() == 1)
    }

    #[instrument(skip_all)]
    async fn record_renewal(
        &self,
        id: Uuid,
        expires_at: DateTime<Utc>,
        renewed_at: DateTime<Utc>,
    ) -> Result<bool, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE identity_access_tokens
            SET expires_at = $2, last_renewed_at = $3
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(expires_at)
        .bind(renewed_at)
        .execute(&self.pool)
        .await;
        metrics::record_db_query("update", TABLE, query_status(&result), start.elapsed());

        let done = result
            .map_err(|e| GcpAuthError::Database(format!("Failed to renew access token: {}", e)))?;
        Ok(done.rows_affected() == 1)
    }

    #[instrument(skip_all)]
    async fn revoke(&self, id: Uuid, revoked_at: DateTime<Utc>) -> Result<bool, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE identity_access_tokens
            SET revoked_at = $2
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(revoked_at)
        .execute(&self.pool)
        .await;
        metrics::record_db_query("update", TABLE, query_status(&result), start.elapsed());

        let done = result
            .map_err(|e| GcpAuthError::Database(format!("Failed to revoke access token: {}", e)))?;
        Ok(done.rows_affected() == 1)
    }
}
