//! PostgreSQL repository tests
//!
//! Each test gets a fresh database with migrations applied. They need a
//! reachable PostgreSQL via `DATABASE_URL` and are ignored otherwise:
//! `cargo test -- --ignored`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use chrono::{Duration, Utc};
use gcp_auth_service::errors::GcpAuthError;
use gcp_auth_service::models::{
    ActorAuthMethod, ActorContext, ActorType, AuditEvent, AuditEventType, GcpAuthType,
    IdentityGcpAuth, IssuedAccessToken, TrustedIp,
};
use gcp_auth_service::repositories::{
    AccessTokenRepository, AuditSink, GcpAuthRepository, IdentityDirectory,
    PgAccessTokenRepository, PgAuditSink, PgGcpAuthRepository, PgIdentityDirectory,
};
use gcp_auth_test_utils::*;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_identity(pool: &PgPool, id: Uuid, org_id: Uuid) -> Result<(), anyhow::Error> {
    sqlx::query("INSERT INTO identities (id, org_id, name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(org_id)
        .bind("ci-runner")
        .execute(pool)
        .await?;
    Ok(())
}

fn sample_config(identity_id: Uuid) -> IdentityGcpAuth {
    let now = Utc::now();
    IdentityGcpAuth {
        id: Uuid::new_v4(),
        identity_id,
        org_id: TEST_ORG_ACME,
        auth_type: GcpAuthType::Gce,
        allowed_service_accounts: TEST_SA_PROJ_A.to_string(),
        allowed_projects: "proj-a".to_string(),
        allowed_zones: String::new(),
        access_token_trusted_ips: vec![TrustedIp {
            ip_address: "10.0.0.0/8".parse().unwrap(),
        }],
        access_token_ttl: 3600,
        access_token_max_ttl: 7200,
        access_token_num_uses_limit: 0,
        created_at: now,
        updated_at: now,
    }
}

fn sample_token(config: &IdentityGcpAuth, uses: Option<i64>) -> IssuedAccessToken {
    let now = Utc::now();
    IssuedAccessToken {
        id: Uuid::new_v4(),
        identity_id: config.identity_id,
        configuration_id: config.id,
        issued_at: now,
        last_renewed_at: now,
        expires_at: now + Duration::seconds(config.access_token_ttl),
        max_expires_at: now + Duration::seconds(config.access_token_max_ttl),
        uses_remaining: uses,
        source_ip: Some("10.1.2.3".to_string()),
        revoked_at: None,
    }
}

// ============================================================================
// identity_gcp_auths
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_insert_then_find_round_trips_trusted_ips(pool: PgPool) -> Result<(), anyhow::Error> {
    seed_identity(&pool, TEST_IDENTITY_CI, TEST_ORG_ACME).await?;
    let repo = PgGcpAuthRepository::new(pool);
    let config = sample_config(TEST_IDENTITY_CI);

    repo.insert(&config).await?;
    let found = repo.find_by_identity(TEST_IDENTITY_CI).await?.unwrap();

    assert_eq!(found.id, config.id);
    assert_eq!(found.auth_type, GcpAuthType::Gce);
    assert_eq!(found.access_token_trusted_ips, config.access_token_trusted_ips);
    assert!(repo.find_by_identity(TEST_IDENTITY_DEPLOY).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_insert_conflict_and_upsert_overwrite(pool: PgPool) -> Result<(), anyhow::Error> {
    seed_identity(&pool, TEST_IDENTITY_CI, TEST_ORG_ACME).await?;
    let repo = PgGcpAuthRepository::new(pool);
    let original = repo.insert(&sample_config(TEST_IDENTITY_CI)).await?;

    let duplicate = repo.insert(&sample_config(TEST_IDENTITY_CI)).await;
    assert!(matches!(duplicate, Err(GcpAuthError::AlreadyExists)));

    let mut replacement = sample_config(TEST_IDENTITY_CI);
    replacement.auth_type = GcpAuthType::Iam;
    replacement.allowed_projects = String::new();
    let stored = repo.upsert(&replacement).await?;

    assert_eq!(stored.id, original.id, "Overwrite keeps the row id");
    assert_eq!(stored.auth_type, GcpAuthType::Iam);
    assert_eq!(stored.allowed_projects, "");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_update_missing_configuration_returns_none(pool: PgPool) -> Result<(), anyhow::Error> {
    seed_identity(&pool, TEST_IDENTITY_CI, TEST_ORG_ACME).await?;
    let repo = PgGcpAuthRepository::new(pool);

    let updated = repo.update(&sample_config(TEST_IDENTITY_CI)).await?;

    assert!(updated.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_schema_rejects_ttl_above_max_ttl(pool: PgPool) -> Result<(), anyhow::Error> {
    seed_identity(&pool, TEST_IDENTITY_CI, TEST_ORG_ACME).await?;
    let repo = PgGcpAuthRepository::new(pool);
    let mut config = sample_config(TEST_IDENTITY_CI);
    config.access_token_ttl = 9000;

    let result = repo.insert(&config).await;

    assert!(matches!(result, Err(GcpAuthError::Database(_))));
    Ok(())
}

// ============================================================================
// identity_access_tokens
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_compare_and_set_uses_only_swaps_expected_value(
    pool: PgPool,
) -> Result<(), anyhow::Error> {
    seed_identity(&pool, TEST_IDENTITY_CI, TEST_ORG_ACME).await?;
    let configs = PgGcpAuthRepository::new(pool.clone());
    let tokens = PgAccessTokenRepository::new(pool);
    let config = configs.insert(&sample_config(TEST_IDENTITY_CI)).await?;
    let token = tokens.create(&sample_token(&config, Some(2))).await?;

    assert!(tokens.compare_and_set_uses(token.id, Some(2), Some(1)).await?);
    assert!(!tokens.compare_and_set_uses(token.id, Some(2), Some(1)).await?);
    assert_eq!(tokens.find(token.id).await?.unwrap().uses_remaining, Some(1));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_revoked_token_rejects_renewal_and_use(pool: PgPool) -> Result<(), anyhow::Error> {
    seed_identity(&pool, TEST_IDENTITY_CI, TEST_ORG_ACME).await?;
    let configs = PgGcpAuthRepository::new(pool.clone());
    let tokens = PgAccessTokenRepository::new(pool);
    let config = configs.insert(&sample_config(TEST_IDENTITY_CI)).await?;
    let token = tokens.create(&sample_token(&config, None)).await?;
    let now = Utc::now();

    assert!(tokens.revoke(token.id, now).await?);
    assert!(!tokens.revoke(token.id, now).await?, "Second revoke is a no-op");
    assert!(!tokens.record_renewal(token.id, now, now).await?);
    assert!(!tokens.compare_and_set_uses(token.id, None, None).await?);
    assert!(tokens.find(token.id).await?.unwrap().revoked_at.is_some());
    Ok(())
}

// ============================================================================
// identities and audit_events
// ============================================================================

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_identity_directory_lookup(pool: PgPool) -> Result<(), anyhow::Error> {
    seed_identity(&pool, TEST_IDENTITY_CI, TEST_ORG_ACME).await?;
    let directory = PgIdentityDirectory::new(pool);

    let identity = directory.find_identity(TEST_IDENTITY_CI).await?.unwrap();

    assert_eq!(identity.org_id, TEST_ORG_ACME);
    assert!(directory.find_identity(TEST_IDENTITY_DEPLOY).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_audit_sink_records_actor_and_metadata(pool: PgPool) -> Result<(), anyhow::Error> {
    let sink = PgAuditSink::new(pool);

    sink.record(&AuditEvent {
        event_type: AuditEventType::AddIdentityGcpAuth,
        org_id: Some(TEST_ORG_ACME),
        identity_id: TEST_IDENTITY_CI,
        actor: Some(ActorContext {
            actor: ActorType::User,
            actor_id: TEST_USER_ALICE,
            actor_org_id: TEST_ORG_ACME,
            actor_auth_method: ActorAuthMethod::UserSession,
        }),
        success: true,
        failure_reason: None,
        ip_address: Some("127.0.0.1".to_string()),
        user_agent: Some("integration-test".to_string()),
        metadata: json!({ "type": "gce" }),
        created_at: Utc::now(),
    })
    .await?;

    let events = sink.list_for_identity(TEST_IDENTITY_CI, 10).await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "add-identity-gcp-auth");
    assert_eq!(events[0].actor_id, Some(TEST_USER_ALICE));
    assert_eq!(events[0].metadata, Some(json!({ "type": "gce" })));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_audit_sink_counts_recent_failed_logins(pool: PgPool) -> Result<(), anyhow::Error> {
    let sink = PgAuditSink::new(pool);
    let now = Utc::now();
    let failed_login = |created_at| AuditEvent {
        event_type: AuditEventType::LoginIdentityGcpAuth,
        org_id: Some(TEST_ORG_ACME),
        identity_id: TEST_IDENTITY_CI,
        actor: None,
        success: false,
        failure_reason: Some("claim_invalid".to_string()),
        ip_address: None,
        user_agent: None,
        metadata: json!({}),
        created_at,
    };

    sink.record(&failed_login(now - Duration::minutes(30))).await?;
    sink.record(&failed_login(now - Duration::minutes(1))).await?;
    sink.record(&failed_login(now)).await?;

    let since = now - Duration::minutes(15);
    assert_eq!(sink.count_failed_logins(TEST_IDENTITY_CI, since).await?, 2);
    assert_eq!(sink.count_failed_logins(TEST_IDENTITY_DEPLOY, since).await?, 0);
    Ok(())
}
