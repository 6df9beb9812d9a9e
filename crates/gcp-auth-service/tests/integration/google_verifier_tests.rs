//! End-to-end login tests against a `wiremock` stand-in for Google's key
//! endpoints, using real signature verification.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use gcp_auth_test_utils::*;
use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IAM_JWKS_PATH: &str = "/service_accounts/v1/jwk";
const GCE_JWKS_PATH: &str = "/oauth2/v3/certs";

struct GoogleFixture {
    server: TestGcpAuthServer,
    google: MockServer,
    key: TestSigningKey,
}

async fn google_fixture() -> Result<GoogleFixture, anyhow::Error> {
    let google = MockServer::start().await;
    let key = TestSigningKey::new(TEST_GOOGLE_KEY_SEED, TEST_GOOGLE_KEY_ID)?;

    Mock::given(method("GET"))
        .and(path(GCE_JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
        .mount(&google)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/{}", IAM_JWKS_PATH, TEST_SA_PROJ_A)))
        .respond_with(ResponseTemplate::new(200).set_body_json(key.jwks()))
        .mount(&google)
        .await;

    let server = TestGcpAuthServer::builder()
        .google_verifier()
        .var(
            "GCP_IAM_JWKS_BASE_URL",
            &format!("{}{}", google.uri(), IAM_JWKS_PATH),
        )
        .var(
            "GCP_GCE_JWKS_URL",
            &format!("{}{}", google.uri(), GCE_JWKS_PATH),
        )
        .spawn()
        .await?;

    Ok(GoogleFixture {
        server,
        google,
        key,
    })
}

async fn attach(server: &TestGcpAuthServer, body: Value) -> Result<(), anyhow::Error> {
    let response = reqwest::Client::new()
        .post(format!(
            "{}/api/v1/gcp-auth/identities/{}",
            server.url(),
            TEST_IDENTITY_CI
        ))
        .bearer_auth(server.user_token(TEST_USER_ALICE, TEST_ORG_ACME))
        .json(&body)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

async fn login(server: &TestGcpAuthServer, jwt: &str) -> Result<reqwest::Response, anyhow::Error> {
    Ok(reqwest::Client::new()
        .post(format!("{}/api/v1/gcp-auth/login", server.url()))
        .json(&json!({ "identityId": TEST_IDENTITY_CI, "jwt": jwt }))
        .send()
        .await?)
}

#[tokio::test]
async fn test_gce_login_with_google_signed_token() -> Result<(), anyhow::Error> {
    let fixture = google_fixture().await?;
    attach(
        &fixture.server,
        json!({
            "type": "gce",
            "allowedServiceAccounts": TEST_SA_PROJ_A,
            "allowedProjects": "proj-a",
            "allowedZones": "us-central1-*"
        }),
    )
    .await?;
    let jwt = GoogleTokenBuilder::gce(TEST_SA_PROJ_A, TEST_PROJECT_A, TEST_ZONE).sign(&fixture.key);

    let response = login(&fixture.server, &jwt).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await?;
    body["accessToken"]
        .as_str()
        .unwrap()
        .to_string()
        .assert_valid_jwt()
        .assert_for_subject(&TEST_IDENTITY_CI.to_string());
    Ok(())
}

#[tokio::test]
async fn test_iam_login_fetches_per_account_keys() -> Result<(), anyhow::Error> {
    let fixture = google_fixture().await?;
    attach(
        &fixture.server,
        json!({ "type": "iam", "allowedProjects": "proj-a" }),
    )
    .await?;
    let jwt = GoogleTokenBuilder::iam(TEST_SA_PROJ_A).sign(&fixture.key);

    let response = login(&fixture.server, &jwt).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let requests = fixture.google.received_requests().await.unwrap_or_default();
    assert!(requests
        .iter()
        .any(|r| r.url.path().starts_with(IAM_JWKS_PATH)));
    Ok(())
}

#[tokio::test]
async fn test_login_with_wrong_audience_fails() -> Result<(), anyhow::Error> {
    let fixture = google_fixture().await?;
    attach(&fixture.server, json!({ "type": "gce" })).await?;
    let jwt = GoogleTokenBuilder::gce(TEST_SA_PROJ_A, TEST_PROJECT_A, TEST_ZONE)
        .audience("https://someone-else.example")
        .sign(&fixture.key);

    let response = login(&fixture.server, &jwt).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await?;
    body.assert_error_code("AUTHENTICATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn test_login_with_expired_token_fails() -> Result<(), anyhow::Error> {
    let fixture = google_fixture().await?;
    attach(&fixture.server, json!({ "type": "gce" })).await?;
    let now = chrono::Utc::now().timestamp();
    let jwt = GoogleTokenBuilder::gce(TEST_SA_PROJ_A, TEST_PROJECT_A, TEST_ZONE)
        .issued_at(now - 7200)
        .expires_at(now - 3600)
        .sign(&fixture.key);

    let response = login(&fixture.server, &jwt).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_iam_token_against_gce_configuration_is_type_mismatch() -> Result<(), anyhow::Error> {
    let fixture = google_fixture().await?;
    attach(&fixture.server, json!({ "type": "gce" })).await?;
    let jwt = GoogleTokenBuilder::iam(TEST_SA_PROJ_A).sign(&fixture.key);

    let response = login(&fixture.server, &jwt).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await?;
    body.assert_error_code("AUTHENTICATION_FAILED");
    Ok(())
}

#[tokio::test]
async fn test_token_signed_by_unknown_key_fails() -> Result<(), anyhow::Error> {
    let fixture = google_fixture().await?;
    attach(&fixture.server, json!({ "type": "gce" })).await?;
    let rogue = TestSigningKey::new(99, "rogue-key")?;
    let jwt = GoogleTokenBuilder::gce(TEST_SA_PROJ_A, TEST_PROJECT_A, TEST_ZONE).sign(&rogue);

    let response = login(&fixture.server, &jwt).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_google_outage_is_service_unavailable() -> Result<(), anyhow::Error> {
    let google = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&google)
        .await;
    let server = TestGcpAuthServer::builder()
        .google_verifier()
        .var("GCP_GCE_JWKS_URL", &format!("{}{}", google.uri(), GCE_JWKS_PATH))
        .spawn()
        .await?;
    attach(&server, json!({ "type": "gce" })).await?;
    let key = TestSigningKey::new(TEST_GOOGLE_KEY_SEED, TEST_GOOGLE_KEY_ID)?;
    let jwt = GoogleTokenBuilder::gce(TEST_SA_PROJ_A, TEST_PROJECT_A, TEST_ZONE).sign(&key);

    let response = login(&server, &jwt).await?;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}
