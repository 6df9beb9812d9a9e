//! Identity directory backed by the identities table.

use crate::errors::GcpAuthError;
use crate::models::Identity;
use crate::observability::metrics;
use crate::repositories::{query_status, IdentityDirectory};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// PostgreSQL-backed [`IdentityDirectory`].
#[derive(Clone)]
pub struct PgIdentityDirectory {
    pool: PgPool,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    #[instrument(skip_all)]
    async fn find_identity(&self, id: Uuid) -> Result<Option<Identity>, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, Identity>(
            r#"
            SELECT id, org_id, name
            FROM identities
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        metrics::record_db_query("select", "identities", query_status(&result), start.elapsed());

        result.map_err(|e| GcpAuthError::Database(format!("Failed to fetch identity: {}", e)))
    }
}
