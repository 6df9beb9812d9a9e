//! Audit event sink (audit_events table).
//!
//! Rows are append-only. Callers treat a failed write as non-fatal and
//! surface it through logs and `gcp_auth_audit_log_failures_total`.

use crate::errors::GcpAuthError;
use crate::models::{AuditEvent, AuditEventRow, AuditEventType};
use crate::observability::metrics;
use crate::repositories::{query_status, AuditSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const TABLE: &str = "audit_events";

/// PostgreSQL-backed [`AuditSink`].
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Most recent events for an identity, newest first.
    #[instrument(skip_all)]
    pub async fn list_for_identity(
        &self,
        identity_id: Uuid,
        limit: i64,
    ) -> Result<Vec<AuditEventRow>, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, AuditEventRow>(
            r#"
            SELECT event_id, event_type, org_id, identity_id, actor_id, success,
                   failure_reason, ip_address, user_agent, metadata, created_at
            FROM audit_events
            WHERE identity_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(identity_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        metrics::record_db_query("select", TABLE, query_status(&result), start.elapsed());

        result.map_err(|e| GcpAuthError::Database(format!("Failed to fetch audit events: {}", e)))
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    #[instrument(skip_all)]
    async fn record(&self, event: &AuditEvent) -> Result<(), GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            INSERT INTO audit_events (
                event_id, event_type, org_id, identity_id, actor_id, actor_type,
                success, failure_reason, ip_address, user_agent, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.event_type.as_str())
        .bind(event.org_id)
        .bind(event.identity_id)
        .bind(event.actor.map(|a| a.actor_id))
        .bind(event.actor.map(|a| a.actor.as_str()))
        .bind(event.success)
        .bind(&event.failure_reason)
        .bind(&event.ip_address)
        .bind(&event.user_agent)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await;
        metrics::record_db_query("insert", TABLE, query_status(&result), start.elapsed());

        result.map_err(|e| GcpAuthError::Database(format!("Failed to log audit event: {}", e)))?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn count_failed_logins(
        &self,
        identity_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, GcpAuthError> {
        let start = Instant::now();
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM audit_events
            WHERE identity_id = $1
              AND event_type = $2
              AND success = false
              AND created_at >= $3
            "#,
        )
        .bind(identity_id)
        .bind(AuditEventType::LoginIdentityGcpAuth.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await;
        metrics::record_db_query("select", TABLE, query_status(&result), start.elapsed());

        let (count,) = result
            .map_err(|e| GcpAuthError::Database(format!("Failed to count failed logins: {}", e)))?;
        Ok(count)
    }
}
