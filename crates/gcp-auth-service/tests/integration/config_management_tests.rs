//! Integration tests for GCP auth configuration management
//!
//! Attach, partial update and read over HTTP, including attach policy,
//! validation and cross-organization permission denial.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use gcp_auth_test_utils::*;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

async fn send(
    server: &TestGcpAuthServer,
    method: Method,
    identity_id: Uuid,
    bearer: Option<&str>,
    body: Option<Value>,
) -> Result<reqwest::Response, anyhow::Error> {
    let mut request = reqwest::Client::new().request(
        method,
        format!("{}/api/v1/gcp-auth/identities/{}", server.url(), identity_id),
    );
    if let Some(bearer) = bearer {
        request = request.bearer_auth(bearer);
    }
    if let Some(body) = body {
        request = request.json(&body);
    }
    Ok(request.send().await?)
}

fn alice(server: &TestGcpAuthServer) -> String {
    server.user_token(TEST_USER_ALICE, TEST_ORG_ACME)
}

// ============================================================================
// Attach
// ============================================================================

#[tokio::test]
async fn test_attach_normalizes_lists_and_applies_defaults() -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);

    // Act
    let response = send(
        &server,
        Method::POST,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({
            "type": "gce",
            "allowedProjects": " proj-a ,, proj-b ",
            "allowedZones": "us-central1-*",
            "accessTokenTrustedIps": [{ "ipAddress": "10.1.2.3" }, { "ipAddress": "2001:db8::/32" }]
        })),
    )
    .await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    let config = &body["identityGcpAuth"];
    assert_eq!(config["identityId"], TEST_IDENTITY_CI.to_string());
    assert_eq!(config["orgId"], TEST_ORG_ACME.to_string());
    assert_eq!(config["type"], "gce");
    assert_eq!(config["allowedProjects"], "proj-a, proj-b");
    assert_eq!(config["allowedZones"], "us-central1-*");
    assert_eq!(config["allowedServiceAccounts"], "");
    assert_eq!(config["accessTokenTTL"], 2_592_000);
    assert_eq!(config["accessTokenMaxTTL"], 2_592_000);
    assert_eq!(config["accessTokenNumUsesLimit"], 0);
    assert_eq!(
        config["accessTokenTrustedIps"],
        json!([{ "ipAddress": "10.1.2.3/32" }, { "ipAddress": "2001:db8::/32" }])
    );

    let events = server.audit_events().await;
    let attach_event = events
        .iter()
        .find(|e| e.event_type.as_str() == "add-identity-gcp-auth")
        .expect("attach should be audited");
    assert_eq!(attach_event.actor.map(|a| a.actor_id), Some(TEST_USER_ALICE));
    assert_eq!(attach_event.metadata["allowedProjects"], "proj-a, proj-b");

    Ok(())
}

#[tokio::test]
async fn test_attach_defaults_trust_all_sources() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);

    let response = send(
        &server,
        Method::POST,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({ "type": "iam" })),
    )
    .await?;

    let body: Value = response.json().await?;
    assert_eq!(
        body["identityGcpAuth"]["accessTokenTrustedIps"],
        json!([{ "ipAddress": "0.0.0.0/0" }, { "ipAddress": "::/0" }])
    );
    Ok(())
}

#[tokio::test]
async fn test_attach_twice_overwrites_by_default() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);

    let first: Value = send(
        &server,
        Method::POST,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({ "type": "gce", "allowedProjects": "proj-a" })),
    )
    .await?
    .json()
    .await?;

    let response = send(
        &server,
        Method::POST,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({ "type": "iam", "allowedServiceAccounts": TEST_SA_PROJ_B })),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let second: Value = response.json().await?;
    assert_eq!(second["identityGcpAuth"]["id"], first["identityGcpAuth"]["id"]);
    assert_eq!(second["identityGcpAuth"]["type"], "iam");
    assert_eq!(second["identityGcpAuth"]["allowedProjects"], "");
    Ok(())
}

#[tokio::test]
async fn test_attach_twice_conflicts_under_reject_policy() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::builder()
        .var("ATTACH_POLICY", "reject")
        .spawn()
        .await?;
    let token = alice(&server);
    let body = json!({ "type": "gce" });

    let response = send(&server, Method::POST, TEST_IDENTITY_CI, Some(&token), Some(body.clone())).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&server, Method::POST, TEST_IDENTITY_CI, Some(&token), Some(body)).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await?;
    body.assert_error_code("ALREADY_EXISTS");
    Ok(())
}

#[tokio::test]
async fn test_attach_rejects_invalid_limits() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);

    for body in [
        json!({ "type": "gce", "accessTokenTTL": 7200, "accessTokenMaxTTL": 3600 }),
        json!({ "type": "gce", "accessTokenTTL": 0 }),
        json!({ "type": "gce", "accessTokenMaxTTL": 315_360_001_i64 }),
        json!({ "type": "gce", "accessTokenNumUsesLimit": -1 }),
        json!({ "type": "gce", "accessTokenTrustedIps": [] }),
        json!({ "type": "gce", "accessTokenTrustedIps": [{ "ipAddress": "10.0.0.0/33" }] }),
    ] {
        let response =
            send(&server, Method::POST, TEST_IDENTITY_CI, Some(&token), Some(body.clone())).await?;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "Expected validation failure for {}",
            body
        );
        let error: Value = response.json().await?;
        error.assert_error_code("VALIDATION_ERROR");
    }
    Ok(())
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_partial_update_changes_only_supplied_fields() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);
    send(
        &server,
        Method::POST,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({
            "type": "gce",
            "allowedProjects": "proj-a",
            "accessTokenTTL": 3600,
            "accessTokenMaxTTL": 7200
        })),
    )
    .await?;

    let response = send(
        &server,
        Method::PATCH,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({ "accessTokenTTL": 1800, "allowedZones": "us-east1-b" })),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    let config = &body["identityGcpAuth"];
    assert_eq!(config["accessTokenTTL"], 1800);
    assert_eq!(config["accessTokenMaxTTL"], 7200);
    assert_eq!(config["allowedProjects"], "proj-a");
    assert_eq!(config["allowedZones"], "us-east1-b");
    assert_eq!(config["type"], "gce");
    Ok(())
}

#[tokio::test]
async fn test_update_revalidates_merged_configuration() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);
    send(
        &server,
        Method::POST,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({ "type": "gce", "accessTokenTTL": 3600, "accessTokenMaxTTL": 7200 })),
    )
    .await?;

    // Only max TTL supplied, but it drops below the stored TTL
    let response = send(
        &server,
        Method::PATCH,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({ "accessTokenMaxTTL": 600 })),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_update_without_configuration_is_not_found() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);

    let response = send(
        &server,
        Method::PATCH,
        TEST_IDENTITY_DEPLOY,
        Some(&token),
        Some(json!({ "accessTokenTTL": 60 })),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    body.assert_error_code("CONFIGURATION_NOT_FOUND");
    Ok(())
}

// ============================================================================
// Read and permissions
// ============================================================================

#[tokio::test]
async fn test_get_returns_attached_configuration() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);
    send(
        &server,
        Method::POST,
        TEST_IDENTITY_CI,
        Some(&token),
        Some(json!({ "type": "iam", "allowedServiceAccounts": TEST_SA_PROJ_A })),
    )
    .await?;

    let response = send(&server, Method::GET, TEST_IDENTITY_CI, Some(&token), None).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["identityGcpAuth"]["allowedServiceAccounts"], TEST_SA_PROJ_A);
    Ok(())
}

#[tokio::test]
async fn test_user_from_other_org_is_forbidden() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let mallory = server.user_token(TEST_USER_MALLORY, TEST_ORG_GLOBEX);

    let response = send(
        &server,
        Method::POST,
        TEST_IDENTITY_CI,
        Some(&mallory),
        Some(json!({ "type": "gce" })),
    )
    .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await?;
    body.assert_error_code("FORBIDDEN");

    // Denied operations are not audited as successes
    assert!(server
        .audit_events()
        .await
        .iter()
        .all(|e| e.event_type.as_str() != "add-identity-gcp-auth"));
    Ok(())
}

#[tokio::test]
async fn test_unknown_identity_is_not_found() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;
    let token = alice(&server);

    let response = send(
        &server,
        Method::GET,
        Uuid::from_u128(2999),
        Some(&token),
        None,
    )
    .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_missing_or_garbage_bearer_is_unauthorized() -> Result<(), anyhow::Error> {
    let server = TestGcpAuthServer::spawn().await?;

    let response = send(&server, Method::GET, TEST_IDENTITY_CI, None, None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response =
        send(&server, Method::GET, TEST_IDENTITY_CI, Some("not-a-token"), None).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}
