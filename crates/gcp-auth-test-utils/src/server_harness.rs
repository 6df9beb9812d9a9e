//! Test server harness for E2E testing
//!
//! Provides `TestGcpAuthServer`, a real HTTP server built from the service's
//! own router, backed by in-memory storage, a mock or Google claim verifier
//! and a manual clock.

use crate::crypto_fixtures::signing_seed_base64;
use crate::test_ids::*;
use gcp_auth_service::auth::google::GoogleClaimVerifier;
use gcp_auth_service::auth::mock::MockClaimVerifier;
use gcp_auth_service::auth::{ClaimSource, ClaimVerifier, GcpIdentityClaims};
use gcp_auth_service::clock::mock::ManualClock;
use gcp_auth_service::clock::Clock;
use gcp_auth_service::config::{decode_signing_seed, Config};
use gcp_auth_service::crypto::{AccessTokenClaims, AuthTokenType, TokenSigner};
use gcp_auth_service::models::{AuditEvent, Identity};
use gcp_auth_service::observability::metrics::prometheus_builder;
use gcp_auth_service::repositories::memory::{
    MemoryAccessTokenRepository, MemoryAuditSink, MemoryGcpAuthRepository,
    MemoryIdentityDirectory,
};
use gcp_auth_service::routes::{self, AppState};
use gcp_auth_service::services::permissions::OrgMembershipPermissionChecker;
use gcp_auth_service::services::{GcpAuthDependencies, GcpAuthService};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Identity claims the default mock verifier accepts: a GCE instance in
/// `proj-a` running as [`TEST_SA_PROJ_A`].
pub fn default_gce_claims() -> GcpIdentityClaims {
    gce_claims(TEST_SA_PROJ_A, TEST_PROJECT_A, TEST_ZONE)
}

pub fn gce_claims(service_account: &str, project_id: &str, zone: &str) -> GcpIdentityClaims {
    GcpIdentityClaims {
        service_account_email: service_account.to_string(),
        project_id: Some(project_id.to_string()),
        zone: Some(zone.to_string()),
        source: ClaimSource::Gce {
            instance_id: "4567890123456789".to_string(),
            instance_name: "ci-runner-1".to_string(),
        },
    }
}

/// Builder for [`TestGcpAuthServer`].
#[derive(Default)]
pub struct TestGcpAuthServerBuilder {
    vars: HashMap<String, String>,
    google_verifier: bool,
}

impl TestGcpAuthServerBuilder {
    /// Override a configuration variable.
    pub fn var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Verify login tokens with the real Google verifier instead of the mock.
    ///
    /// Point `GCP_IAM_JWKS_BASE_URL` and `GCP_GCE_JWKS_URL` at a mock server.
    pub fn google_verifier(mut self) -> Self {
        self.google_verifier = true;
        self
    }

    pub async fn spawn(self) -> Result<TestGcpAuthServer, anyhow::Error> {
        let mut vars = HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://test/test".to_string(),
            ),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            (
                "GCP_AUTH_SIGNING_KEY".to_string(),
                signing_seed_base64(TEST_SIGNING_SEED),
            ),
            ("GCP_AUTH_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
        ]);
        vars.extend(self.vars);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let clock = Arc::new(ManualClock::starting_now());
        let seed = decode_signing_seed(&config.signing_key_seed)?;
        let signer = Arc::new(TokenSigner::from_seed(&seed, config.clock_skew())?);

        let mock_verifier = Arc::new(MockClaimVerifier::accepting(default_gce_claims()));
        let verifier: Arc<dyn ClaimVerifier> = if self.google_verifier {
            Arc::new(GoogleClaimVerifier::from_config(&config, clock.clone()))
        } else {
            mock_verifier.clone()
        };

        let identities = Arc::new(MemoryIdentityDirectory::new());
        for (id, org_id, name) in [
            (TEST_IDENTITY_CI, TEST_ORG_ACME, "ci-runner"),
            (TEST_IDENTITY_DEPLOY, TEST_ORG_ACME, "deployer"),
            (TEST_IDENTITY_OTHER_ORG, TEST_ORG_GLOBEX, "globex-runner"),
        ] {
            identities
                .insert(Identity {
                    id,
                    org_id,
                    name: name.to_string(),
                })
                .await;
        }

        let tokens = Arc::new(MemoryAccessTokenRepository::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let deps = GcpAuthDependencies {
            configs: Arc::new(MemoryGcpAuthRepository::new()),
            tokens: tokens.clone(),
            identities: identities.clone(),
            permissions: Arc::new(OrgMembershipPermissionChecker),
            verifier,
            audit: audit.clone(),
        };
        let service = Arc::new(GcpAuthService::new(
            deps,
            signer.clone(),
            clock.clone(),
            config.attach_policy,
        ));

        // Not installed globally; each server gets its own recorder handle.
        let metrics_handle = prometheus_builder()
            .map_err(|e| anyhow::anyhow!(e))?
            .build_recorder()
            .handle();

        let state = Arc::new(AppState {
            service: service.clone(),
            config: config.clone(),
        });
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(TestGcpAuthServer {
            addr,
            config,
            service,
            signer,
            mock_verifier,
            clock,
            identities,
            tokens,
            audit,
            _handle: handle,
        })
    }
}

/// Test harness for spawning the GCP auth service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestGcpAuthServer::spawn().await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGcpAuthServer {
    addr: SocketAddr,
    config: Config,
    service: Arc<GcpAuthService>,
    signer: Arc<TokenSigner>,
    mock_verifier: Arc<MockClaimVerifier>,
    clock: Arc<ManualClock>,
    identities: Arc<MemoryIdentityDirectory>,
    tokens: Arc<MemoryAccessTokenRepository>,
    audit: Arc<MemoryAuditSink>,
    _handle: JoinHandle<()>,
}

impl TestGcpAuthServer {
    /// Spawn a server with default configuration and the mock verifier.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::builder().spawn().await
    }

    pub fn builder() -> TestGcpAuthServerBuilder {
        TestGcpAuthServerBuilder::default()
    }

    /// Base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &GcpAuthService {
        &self.service
    }

    /// Mock verifier (inactive when built with `google_verifier()`).
    pub fn verifier(&self) -> &MockClaimVerifier {
        &self.mock_verifier
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn signing_key_id(&self) -> &str {
        self.signer.key_id()
    }

    pub fn tokens(&self) -> &MemoryAccessTokenRepository {
        &self.tokens
    }

    /// Add a machine identity to the directory.
    pub async fn add_identity(&self, id: Uuid, org_id: Uuid, name: &str) {
        self.identities
            .insert(Identity {
                id,
                org_id,
                name: name.to_string(),
            })
            .await;
    }

    /// All audit events recorded so far, oldest first.
    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.audit.events().await
    }

    /// Make the audit sink fail (or recover).
    pub fn set_audit_failing(&self, failing: bool) {
        self.audit.set_failing(failing);
    }

    /// A platform user session token for `user_id` in `org_id`, valid for an hour.
    pub fn user_token(&self, user_id: Uuid, org_id: Uuid) -> String {
        let now = self.clock.now().timestamp();
        self.signer
            .sign(&AccessTokenClaims {
                sub: user_id.to_string(),
                jti: Uuid::new_v4().to_string(),
                org_id,
                auth_token_type: AuthTokenType::User,
                iat: now,
                exp: now + 3600,
            })
            .expect("user session token should sign")
    }
}

impl Drop for TestGcpAuthServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
