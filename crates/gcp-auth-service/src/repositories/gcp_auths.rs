//! GCP auth configuration repository (identity_gcp_auths table).
//!
//! # Security
//!
//! - All queries use parameterized statements (SQL injection safe)
//! - Attach-overwrite is a single `INSERT ... ON CONFLICT DO UPDATE`, so
//!   readers never observe a partially written configuration

use crate::errors::GcpAuthError;
use crate::models::{IdentityGcpAuth, IdentityGcpAuthRow};
use crate::observability::metrics;
use crate::repositories::{query_status, GcpAuthRepository};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

const TABLE: &str = "identity_gcp_auths";

const RETURNING_COLUMNS: &str = r#"
    id, identity_id, org_id, auth_type,
    allowed_service_accounts, allowed_projects, allowed_zones,
    access_token_trusted_ips, access_token_ttl, access_token_max_ttl,
    access_token_num_uses_limit, created_at, updated_at
"#;

/// PostgreSQL-backed [`GcpAuthRepository`].
#[derive(Clone)]
pub struct PgGcpAuthRepository {
    pool: PgPool,
}

impl PgGcpAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn trusted_ip_strings(config: &IdentityGcpAuth) -> Vec<String> {
    config
        .access_token_trusted_ips
        .iter()
        .map(|ip| ip.ip_address.to_string())
        .collect()
}

fn into_config(row: Option<IdentityGcpAuthRow>) -> Result<Option<IdentityGcpAuth>, GcpAuthError> {
    row.map(IdentityGcpAuth::try_from).transpose()
}

#[async_trait]
impl GcpAuthRepository for PgGcpAuthRepository {
    #[instrument(skip_all)]
    async fn find_by_identity(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<IdentityGcpAuth>, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, IdentityGcpAuthRow>(&format!(
            "SELECT {RETURNING_COLUMNS} FROM identity_gcp_auths WHERE identity_id = $1"
        ))
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await;
        metrics::record_db_query("select", TABLE, query_status(&result), start.elapsed());

        let row = result.map_err(|e| {
            GcpAuthError::Database(format!("Failed to fetch GCP auth configuration: {}", e))
        })?;
        into_config(row)
    }

    #[instrument(skip_all)]
    async fn insert(&self, config: &IdentityGcpAuth) -> Result<IdentityGcpAuth, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, IdentityGcpAuthRow>(&format!(
            r#"
            INSERT INTO identity_gcp_auths (
                id, identity_id, org_id, auth_type,
                allowed_service_accounts, allowed_projects, allowed_zones,
                access_token_trusted_ips, access_token_ttl, access_token_max_ttl,
                access_token_num_uses_limit, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (identity_id) DO NOTHING
            RETURNING {RETURNING_COLUMNS}
            "#
        ))
        .bind(config.id)
        .bind(config.identity_id)
        .bind(config.org_id)
        .bind(config.auth_type.as_str())
        .bind(&config.allowed_service_accounts)
        .bind(&config.allowed_projects)
        .bind(&config.allowed_zones)
        .bind(trusted_ip_strings(config))
        .bind(config.access_token_ttl)
        .bind(config.access_token_max_ttl)
        .bind(config.access_token_num_uses_limit)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_optional(&self.pool)
        .await;
        metrics::record_db_query("insert", TABLE, query_status(&result), start.elapsed());

        let row = result.map_err(|e| {
            GcpAuthError::Database(format!("Failed to insert GCP auth configuration: {}", e))
        })?;
        into_config(row)?.ok_or(GcpAuthError::AlreadyExists)
    }

    #[instrument(skip_all)]
    async fn upsert(&self, config: &IdentityGcpAuth) -> Result<IdentityGcpAuth, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, IdentityGcpAuthRow>(&format!(
            r#"
            INSERT INTO identity_gcp_auths (
                id, identity_id, org_id, auth_type,
                allowed_service_accounts, allowed_projects, allowed_zones,
                access_token_trusted_ips, access_token_ttl, access_token_max_ttl,
                access_token_num_uses_limit, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (identity_id) DO UPDATE SET
                org_id = EXCLUDED.org_id,
                auth_type = EXCLUDED.auth_type,
                allowed_service_accounts = EXCLUDED.allowed_service_accounts,
                allowed_projects = EXCLUDED.allowed_projects,
                allowed_zones = EXCLUDED.allowed_zones,
                access_token_trusted_ips = EXCLUDED.access_token_trusted_ips,
                access_token_ttl = EXCLUDED.access_token_ttl,
                access_token_max_ttl = EXCLUDED.access_token_max_ttl,
                access_token_num_uses_limit = EXCLUDED.access_token_num_uses_limit,
                updated_at = EXCLUDED.updated_at
            RETURNING {RETURNING_COLUMNS}
            "#
        ))
        .bind(config.id)
        .bind(config.identity_id)
        .bind(config.org_id)
        .bind(config.auth_type.as_str())
        .bind(&config.allowed_service_accounts)
        .bind(&config.allowed_projects)
        .bind(&config.allowed_zones)
        .bind(trusted_ip_strings(config))
        .bind(config.access_token_ttl)
        .bind(config.access_token_max_ttl)
        .bind(config.access_token_num_uses_limit)
        .bind(config.created_at)
        .bind(config.updated_at)
        .fetch_one(&self.pool)
        .await;
        metrics::record_db_query("upsert", TABLE, query_status(&result), start.elapsed());

        let row = result.map_err(|e| {
            GcpAuthError::Database(format!("Failed to upsert GCP auth configuration: {}", e))
        })?;
        IdentityGcpAuth::try_from(row)
    }

    #[instrument(skip_all)]
    async fn update(
        &self,
        config: &IdentityGcpAuth,
    ) -> Result<Option<IdentityGcpAuth>, GcpAuthError> {
        let start = Instant::now();
        let result = sqlx::query_as::<_, IdentityGcpAuthRow>(&format!(
            r#"
            UPDATE identity_gcp_auths SET
                auth_type = $2,
                allowed_service_accounts = $3,
                allowed_projects = $4,
                allowed_zones = $5,
                access_token_trusted_ips = $6,
                access_token_ttl = $7,
                access_token_max_ttl = $8,
                access_token_num_uses_limit = $9,
                updated_at = $10
            WHERE identity_id = $1
            RETURNING {RETURNING_COLUMNS}
            "#
        ))
        .bind(config.identity_id)
        .bind(config.auth_type.as_str())
        .bind(&config.allowed_service_accounts)
        .bind(&config.allowed_projects)
        .bind(&config.allowed_zones)
        .bind(trusted_ip_strings(config))
        .bind(config.access_token_ttl)
        .bind(config.access_token_max_ttl)
        .bind(config.access_token_num_uses_limit)
        .bind(config.updated_at)
        .fetch_optional(&self.pool)
        .await;
        metrics::record_db_query("update", TABLE, query_status(&result), start.elapsed());

        let row = result.map_err(|e| {
            GcpAuthError::Database(format!("Failed to update GCP auth configuration: {}", e))
        })?;
        into_config(row)
    }
}
