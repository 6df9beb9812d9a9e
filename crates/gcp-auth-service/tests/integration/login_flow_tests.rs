//! Integration tests for the GCP login flow
//!
//! Drives attach -> login -> authenticated use over HTTP against a server
//! backed by in-memory storage and a mock claim verifier.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use gcp_auth_service::auth::{ClaimError, ClaimSource, GcpIdentityClaims};
use gcp_auth_test_utils::*;
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

async fn attach(
    server: &TestGcpAuthServer,
    identity_id: Uuid,
    body: Value,
) -> Result<reqwest::Response, anyhow::Error> {
    let token = server.user_token(TEST_USER_ALICE, TEST_ORG_ACME);
    Ok(reqwest::Client::new()
        .post(format!(
            "{}/api/v1/gcp-auth/identities/{}",
            server.url(),
            identity_id
        ))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await?)
}

async fn login(
    server: &TestGcpAuthServer,
    identity_id: Uuid,
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(reqwest::Client::new()
        .post(format!("{}/api/v1/gcp-auth/login", server.url()))
        .json(&json!({ "identityId": identity_id, "jwt": "header.payload.signature" }))
        .send()
        .await?)
}

async fn use_token(
    server: &TestGcpAuthServer,
    identity_id: Uuid,
    access_token: &str,
) -> Result<reqwest::Response, anyhow::Error> {
    Ok(reqwest::Client::new()
        .get(format!(
            "{}/api/v1/gcp-auth/identities/{}",
            server.url(),
            identity_id
        ))
        .bearer_auth(access_token)
        .send()
        .await?)
}

// ============================================================================
// Successful login
// ============================================================================

#[tokio::test]
async fn test_login_issues_token_that_spends_uses_until_exhausted() -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestGcpAuthServer::spawn().await?;
    let response = attach(
        &server,
        TEST_IDENTITY_CI,
        json!({
            "type": "gce",
            "allowedProjects": "proj-a",
            "accessTokenNumUsesLimit": 2
        }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    // Act
    let response = login(&server, TEST_IDENTITY_CI).await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["expiresIn"], 2_592_000);
    assert_eq!(body["accessTokenMaxTTL"], 2_592_000);

    let access_token = body["accessToken"].as_str().unwrap().to_string();
    access_token
        .assert_valid_jwt()
        .assert_signed_by(server.signing_key_id())
        .assert_for_subject(&TEST_IDENTITY_CI.to_string())
        .assert_token_type("identityAccessToken")
        .assert_horizon(2_592_000);

    for _ in 0..2 {
        let response = use_token(&server, TEST_IDENTITY_CI, &access_token).await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = use_token(&server, TEST_IDENTITY_CI, &access_token).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await?;
    body.assert_error_code("TOKEN_USE_LIMIT_REACHED");

    Ok(())
}

#[tokio::test]
async fn test_login_records_success_audit_event_with_instance_metadata(
) -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let attached: Value = attach(&server, TEST_IDENTITY_CI, json!({ "type": "gce" }))
        .await?
        .json()
        .await?;
    let config_id = attached["identityGcpAuth"]["id"].clone();
    assert!(config_id.is_string());

    let response = login(&server, TEST_IDENTITY_CI).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let events = server.audit_events().await;
    let login_event = events
        .iter()
        .find(|e| e.event_type.as_str() == "login-identity-gcp-auth")
        .expect("login should be audited");
    assert!(login_event.success);
    assert_eq!(login_event.org_id, Some(TEST_ORG_ACME));
    assert_eq!(login_event.ip_address.as_deref(), Some("127.0.0.1"));
    assert_eq!(login_event.metadata["instanceName"], "ci-runner-1");
    assert_eq!(login_event.metadata["serviceAccountEmail"], TEST_SA_PROJ_A);
    assert_eq!(login_event.metadata["identityGcpAuthId"], config_id);

    Ok(())
}

#[tokio::test]
async fn test_iam_login_with_service_account_glob() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    server.verifier().set_claims(GcpIdentityClaims {
        service_account_email: TEST_SA_PROJ_A.to_string(),
        project_id: Some(TEST_PROJECT_A.to_string()),
        zone: None,
        source: ClaimSource::Iam,
    });
    attach(
        &server,
        TEST_IDENTITY_CI,
        json!({
            "type": "iam",
            "allowedServiceAccounts": "*@proj-a.iam.gserviceaccount.com"
        }),
    )
    .await?;

    let response = login(&server, TEST_IDENTITY_CI).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

// ============================================================================
// Rejected logins
// ============================================================================

#[tokio::test]
async fn test_login_from_unlisted_project_is_denied_without_naming_field(
) -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    server
        .verifier()
        .set_claims(gce_claims(TEST_SA_PROJ_B, TEST_PROJECT_B, TEST_ZONE));
    attach(
        &server,
        TEST_IDENTITY_CI,
        json!({ "type": "gce", "allowedProjects": "proj-a" }),
    )
    .await?;

    let response = login(&server, TEST_IDENTITY_CI).await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await?;
    body.assert_error_code("ACCESS_DENIED")
        .assert_message_excludes("project");

    let events = server.audit_events().await;
    let login_event = events
        .iter()
        .find(|e| e.event_type.as_str() == "login-identity-gcp-auth")
        .expect("failed login should be audited");
    assert!(!login_event.success);
    assert!(login_event.failure_reason.is_some());
    assert!(server.tokens().is_empty().await);

    Ok(())
}

#[tokio::test]
async fn test_login_from_untrusted_ip_skips_verification() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::builder()
        .var("TRUST_FORWARDED_FOR", "true")
        .spawn()
        .await?;
    attach(
        &server,
        TEST_IDENTITY_CI,
        json!({
            "type": "gce",
            "accessTokenTrustedIps": [{ "ipAddress": "10.0.0.0/8" }]
        }),
    )
    .await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/gcp-auth/login", server.url()))
        .header("x-forwarded-for", "203.0.113.5")
        .json(&json!({ "identityId": TEST_IDENTITY_CI, "jwt": "a.b.c" }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        server.verifier().call_count(),
        0,
        "Untrusted source must be rejected before the token is verified"
    );
    Ok(())
}

#[tokio::test]
async fn test_login_from_trusted_forwarded_ip_succeeds() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::builder()
        .var("TRUST_FORWARDED_FOR", "true")
        .spawn()
        .await?;
    attach(
        &server,
        TEST_IDENTITY_CI,
        json!({
            "type": "gce",
            "accessTokenTrustedIps": [{ "ipAddress": "10.0.0.0/8" }]
        }),
    )
    .await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/gcp-auth/login", server.url()))
        .header("x-forwarded-for", "10.1.2.3, 198.51.100.7")
        .json(&json!({ "identityId": TEST_IDENTITY_CI, "jwt": "a.b.c" }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_login_type_mismatch_is_authentication_failure() -> Result<(), anyhow::Error> {
    // Mock returns GCE claims; configuration expects IAM
    let server = TestGcpAuthServer::spawn().await?;
    attach(&server, TEST_IDENTITY_CI, json!({ "type": "iam" })).await?;

    let response = login(&server, TEST_IDENTITY_CI).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await?;
    body.assert_error_code("AUTHENTICATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn test_login_without_configuration_looks_like_bad_claim() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    attach(&server, TEST_IDENTITY_CI, json!({ "type": "gce" })).await?;
    server
        .verifier()
        .set_error(ClaimError::Invalid("bad signature".to_string()));

    let unconfigured = login(&server, TEST_IDENTITY_DEPLOY).await?;
    let bad_claim = login(&server, TEST_IDENTITY_CI).await?;

    assert_eq!(unconfigured.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(bad_claim.status(), StatusCode::UNAUTHORIZED);
    let unconfigured: Value = unconfigured.json().await?;
    let bad_claim: Value = bad_claim.json().await?;
    unconfigured.assert_error_code("AUTHENTICATION_FAILED");
    assert_eq!(unconfigured, bad_claim);

    // The specific reason stays in the audit log
    let events = server.audit_events().await;
    let event = events
        .iter()
        .find(|e| e.identity_id == TEST_IDENTITY_DEPLOY)
        .expect("failed login should be audited");
    assert!(!event.success);
    assert_eq!(event.failure_reason.as_deref(), Some("configuration_not_found"));
    Ok(())
}

// ============================================================================
// Lockout
// ============================================================================

#[tokio::test]
async fn test_repeated_failed_logins_lock_identity_out() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    attach(&server, TEST_IDENTITY_CI, json!({ "type": "gce" })).await?;
    attach(&server, TEST_IDENTITY_DEPLOY, json!({ "type": "gce" })).await?;
    server
        .verifier()
        .set_error(ClaimError::Invalid("bad signature".to_string()));

    for _ in 0..5 {
        let response = login(&server, TEST_IDENTITY_CI).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // Even a valid identity token is refused while locked out
    server.verifier().set_claims(default_gce_claims());
    let response = login(&server, TEST_IDENTITY_CI).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json().await?;
    body.assert_error_code("RATE_LIMIT_EXCEEDED");
    assert_eq!(server.verifier().call_count(), 5);

    // Other identities are unaffected
    let response = login(&server, TEST_IDENTITY_DEPLOY).await?;
    assert_eq!(response.status(), StatusCode::OK);

    server.clock().advance_secs(16 * 60);
    let response = login(&server, TEST_IDENTITY_CI).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_four_failures_do_not_lock_out() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    attach(&server, TEST_IDENTITY_CI, json!({ "type": "gce" })).await?;
    server
        .verifier()
        .set_error(ClaimError::Invalid("expired".to_string()));
    for _ in 0..4 {
        login(&server, TEST_IDENTITY_CI).await?;
    }

    server.verifier().set_claims(default_gce_claims());
    let response = login(&server, TEST_IDENTITY_CI).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn test_login_succeeds_when_audit_sink_fails() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    attach(&server, TEST_IDENTITY_CI, json!({ "type": "gce" })).await?;
    server.set_audit_failing(true);

    let response = login(&server, TEST_IDENTITY_CI).await?;

    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
