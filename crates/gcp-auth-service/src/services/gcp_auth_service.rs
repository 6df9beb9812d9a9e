//! GCP auth orchestration.
//!
//! Composes configuration storage, the claim verifier, allow-list matching,
//! trusted-IP checks and the token lifecycle into the login, configuration
//! management and token operations exposed over HTTP.
//!
//! Login runs in a fixed order: lockout check, configuration lookup, source-IP
//! check, claim verification, allow-list match, issuance. Nothing is persisted
//! unless every stage passes, and the source-IP check runs before the verifier
//! is called.

use crate::auth::{ClaimSource, ClaimVerifier, GcpIdentityClaims};
use crate::clock::Clock;
use crate::config::AttachPolicy;
use crate::crypto::{AccessTokenClaims, AuthTokenType, TokenSigner};
use crate::errors::GcpAuthError;
use crate::models::{
    ActorAuthMethod, ActorContext, ActorType, AttachGcpAuthRequest, AuditEvent, AuditEventType,
    Identity, IdentityGcpAuth, IssuedAccessToken, RequestInfo, UpdateGcpAuthRequest,
    MAX_ACCESS_TOKEN_TTL_SECONDS,
};
use crate::observability::{failure_reason, hash_for_correlation, metrics, ErrorCategory};
use crate::repositories::{AccessTokenRepository, AuditSink, GcpAuthRepository, IdentityDirectory};
use crate::services::allow_list::{authorize_claims, normalize};
use crate::services::permissions::{IdentityAction, PermissionChecker};
use crate::services::token_lifecycle::TokenLifecycleManager;
use crate::services::trusted_ips::{is_trusted, parse_trusted_ips};
use chrono::{DateTime, Duration, Utc};
use common::secret::{ExposeSecret, SecretString};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;
use uuid::Uuid;

/// Attempts at the use-count compare-and-set before giving up.
pub const MAX_CONSUME_ATTEMPTS: usize = 5;

/// Failed logins within the lockout window that lock an identity out.
pub const LOGIN_LOCKOUT_THRESHOLD: i64 = 5;

/// Sliding window over which failed logins are counted.
pub const LOGIN_LOCKOUT_WINDOW_MINUTES: i64 = 15;

/// Storage and policy collaborators for [`GcpAuthService`].
#[derive(Clone)]
pub struct GcpAuthDependencies {
    pub configs: Arc<dyn GcpAuthRepository>,
    pub tokens: Arc<dyn AccessTokenRepository>,
    pub identities: Arc<dyn IdentityDirectory>,
    pub permissions: Arc<dyn PermissionChecker>,
    pub verifier: Arc<dyn ClaimVerifier>,
    pub audit: Arc<dyn AuditSink>,
}

/// Result of a successful login or renewal.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    /// Signed bearer JWT.
    pub access_token: String,
    pub token: IssuedAccessToken,
    /// Seconds until the stored token expires.
    pub expires_in: i64,
    pub access_token_max_ttl: i64,
}

/// The GCP auth engine.
#[derive(Clone)]
pub struct GcpAuthService {
    deps: GcpAuthDependencies,
    signer: Arc<TokenSigner>,
    lifecycle: TokenLifecycleManager,
    clock: Arc<dyn Clock>,
    attach_policy: AttachPolicy,
}

impl GcpAuthService {
    pub fn new(
        deps: GcpAuthDependencies,
        signer: Arc<TokenSigner>,
        clock: Arc<dyn Clock>,
        attach_policy: AttachPolicy,
    ) -> Self {
        Self {
            deps,
            signer,
            lifecycle: TokenLifecycleManager::new(clock.clone()),
            clock,
            attach_policy,
        }
    }

    pub fn attach_policy(&self) -> AttachPolicy {
        self.attach_policy
    }

    // ========================================================================
    // Login
    // ========================================================================

    /// Exchange a GCP identity token for an access token.
    ///
    /// Emits one audit event per attempt, successful or not. A missing
    /// configuration is reported to the caller as a plain authentication
    /// failure; the audit event and logs keep the specific reason.
    #[instrument(skip_all, fields(identity = %hash_for_correlation(&identity_id.to_string())))]
    pub async fn login(
        &self,
        identity_id: Uuid,
        jwt: &SecretString,
        request: &RequestInfo,
    ) -> Result<LoginOutcome, GcpAuthError> {
        let start = Instant::now();
        let mut config_seen: Option<IdentityGcpAuth> = None;

        let result = self
            .login_inner(identity_id, jwt, request, &mut config_seen)
            .await;

        let auth_type = config_seen
            .as_ref()
            .map_or("unknown", |c| c.auth_type.as_str());
        let org_id = config_seen.as_ref().map(|c| c.org_id);

        match &result {
            Ok((outcome, claims)) => {
                metrics::record_login(auth_type, "success", "none", start.elapsed());
                tracing::info!(
                    target: "gcp_auth.service",
                    auth_type = auth_type,
                    service_account = %hash_for_correlation(&claims.service_account_email),
                    "GCP auth login succeeded"
                );
                self.emit_audit(AuditEvent {
                    event_type: AuditEventType::LoginIdentityGcpAuth,
                    created_at: self.clock.now(),
                    org_id,
                    identity_id,
                    actor: None,
                    success: true,
                    failure_reason: None,
                    ip_address: request.ip_address.map(|ip| ip.to_string()),
                    user_agent: request.user_agent.clone(),
                    metadata: login_metadata(claims, &outcome.token),
                })
                .await;
            }
            Err(err) => {
                let reason = failure_reason(err);
                metrics::record_login(auth_type, "error", reason, start.elapsed());
                record_operation_error("login", err);
                tracing::warn!(
                    target: "gcp_auth.service",
                    auth_type = auth_type,
                    reason = reason,
                    error = %err,
                    "GCP auth login failed"
                );
                self.emit_audit(AuditEvent {
                    event_type: AuditEventType::LoginIdentityGcpAuth,
                    created_at: self.clock.now(),
                    org_id,
                    identity_id,
                    actor: None,
                    success: false,
                    failure_reason: Some(reason.to_string()),
                    ip_address: request.ip_address.map(|ip| ip.to_string()),
                    user_agent: request.user_agent.clone(),
                    metadata: json!({}),
                })
                .await;
            }
        }

        result.map(|(outcome, _)| outcome).map_err(|err| match err {
            GcpAuthError::ConfigurationNotFound => {
                GcpAuthError::ClaimInvalid("no GCP auth configuration for identity".to_string())
            }
            other => other,
        })
    }

    async fn login_inner(
        &self,
        identity_id: Uuid,
        jwt: &SecretString,
        request: &RequestInfo,
        config_seen: &mut Option<IdentityGcpAuth>,
    ) -> Result<(LoginOutcome, GcpIdentityClaims), GcpAuthError> {
        self.ensure_not_locked_out(identity_id).await?;

        let config = self
            .deps
            .configs
            .find_by_identity(identity_id)
            .await?
            .ok_or(GcpAuthError::ConfigurationNotFound)?;
        *config_seen = Some(config.clone());

        if !is_trusted(&config.access_token_trusted_ips, request.ip_address) {
            return Err(GcpAuthError::IpNotTrusted);
        }

        let claims = self
            .deps
            .verifier
            .verify(jwt.expose_secret(), config.auth_type)
            .await?;

        authorize_claims(&config, &claims)?;

        let token = self
            .lifecycle
            .issue(&config, identity_id, request.ip_address);
        let access_token = self.sign_identity_token(&token, &config)?;
        let token = self.deps.tokens.create(&token).await?;

        let outcome = LoginOutcome {
            access_token,
            expires_in: (token.expires_at - token.issued_at).num_seconds(),
            access_token_max_ttl: config.access_token_max_ttl,
            token,
        };
        Ok((outcome, claims))
    }

    /// Reject logins for an identity with too many recent failures.
    ///
    /// An unreadable audit store does not block logins; the lookup failure
    /// is logged and counted like a failed audit write.
    async fn ensure_not_locked_out(&self, identity_id: Uuid) -> Result<(), GcpAuthError> {
        let since = self.clock.now() - Duration::minutes(LOGIN_LOCKOUT_WINDOW_MINUTES);
        match self.deps.audit.count_failed_logins(identity_id, since).await {
            Ok(failed) if failed >= LOGIN_LOCKOUT_THRESHOLD => {
                tracing::warn!(
                    target: "gcp_auth.service",
                    identity = %hash_for_correlation(&identity_id.to_string()),
                    failed_attempts = failed,
                    "Identity locked out due to excessive failed logins"
                );
                Err(GcpAuthError::RateLimitExceeded)
            }
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    target: "gcp_auth.audit",
                    error = %e,
                    "Failed to read login failures, skipping lockout check"
                );
                metrics::record_audit_log_failure(
                    AuditEventType::LoginIdentityGcpAuth.as_str(),
                    "lockout_lookup_error",
                );
                Ok(())
            }
        }
    }

    fn sign_identity_token(
        &self,
        token: &IssuedAccessToken,
        config: &IdentityGcpAuth,
    ) -> Result<String, GcpAuthError> {
        let claims = AccessTokenClaims {
            sub: token.identity_id.to_string(),
            jti: token.id.to_string(),
            org_id: config.org_id,
            auth_token_type: AuthTokenType::IdentityAccessToken,
            iat: token.issued_at.timestamp(),
            exp: token.max_expires_at.timestamp(),
        };
        self.signer.sign(&claims)
    }

    // ========================================================================
    // Configuration management
    // ========================================================================

    /// Attach GCP auth to an identity.
    ///
    /// An existing configuration is overwritten or rejected according to the
    /// configured [`AttachPolicy`].
    #[instrument(skip_all, fields(identity = %hash_for_correlation(&identity_id.to_string())))]
    pub async fn attach(
        &self,
        actor: &ActorContext,
        identity_id: Uuid,
        input: AttachGcpAuthRequest,
        request: &RequestInfo,
    ) -> Result<IdentityGcpAuth, GcpAuthError> {
        let result = self.attach_inner(actor, identity_id, input).await;
        self.finish_config_operation(
            "attach",
            AuditEventType::AddIdentityGcpAuth,
            actor,
            identity_id,
            request,
            result,
        )
        .await
    }

    async fn attach_inner(
        &self,
        actor: &ActorContext,
        identity_id: Uuid,
        input: AttachGcpAuthRequest,
    ) -> Result<IdentityGcpAuth, GcpAuthError> {
        let identity = self
            .authorize(actor, identity_id, IdentityAction::Create)
            .await?;

        validate_token_limits(
            input.access_token_ttl,
            input.access_token_max_ttl,
            input.access_token_num_uses_limit,
        )?;
        let trusted_ips = parse_trusted_ips(&input.access_token_trusted_ips)?;

        let now = self.clock.now();
        let config = IdentityGcpAuth {
            id: Uuid::new_v4(),
            identity_id,
            org_id: identity.org_id,
            auth_type: input.auth_type,
            allowed_service_accounts: normalize(&input.allowed_service_accounts),
            allowed_projects: normalize(&input.allowed_projects),
            allowed_zones: normalize(&input.allowed_zones),
            access_token_trusted_ips: trusted_ips,
            access_token_ttl: input.access_token_ttl,
            access_token_max_ttl: input.access_token_max_ttl,
            access_token_num_uses_limit: input.access_token_num_uses_limit,
            created_at: now,
            updated_at: now,
        };

        match self.attach_policy {
            AttachPolicy::Overwrite => self.deps.configs.upsert(&config).await,
            AttachPolicy::Reject => self.deps.configs.insert(&config).await,
        }
    }

    /// Patch an identity's GCP auth configuration.
    ///
    /// Only supplied fields change; the merged record is re-validated.
    #[instrument(skip_all, fields(identity = %hash_for_correlation(&identity_id.to_string())))]
    pub async fn update(
        &self,
        actor: &ActorContext,
        identity_id: Uuid,
        patch: UpdateGcpAuthRequest,
        request: &RequestInfo,
    ) -> Result<IdentityGcpAuth, GcpAuthError> {
        let result = self.update_inner(actor, identity_id, patch).await;
        self.finish_config_operation(
            "update",
            AuditEventType::UpdateIdentityGcpAuth,
            actor,
            identity_id,
            request,
            result,
        )
        .await
    }

    async fn update_inner(
        &self,
        actor: &ActorContext,
        identity_id: Uuid,
        patch: UpdateGcpAuthRequest,
    ) -> Result<IdentityGcpAuth, GcpAuthError> {
        self.authorize(actor, identity_id, IdentityAction::Edit)
            .await?;

        let existing = self
            .deps
            .configs
            .find_by_identity(identity_id)
            .await?
            .ok_or(GcpAuthError::ConfigurationNotFound)?;

        let access_token_trusted_ips = match &patch.access_token_trusted_ips {
            Some(inputs) => parse_trusted_ips(inputs)?,
            None => existing.access_token_trusted_ips.clone(),
        };

        let merged = IdentityGcpAuth {
            auth_type: patch.auth_type.unwrap_or(existing.auth_type),
            allowed_service_accounts: patch
                .allowed_service_accounts
                .as_deref()
                .map_or_else(|| existing.allowed_service_accounts.clone(), normalize),
            allowed_projects: patch
                .allowed_projects
                .as_deref()
                .map_or_else(|| existing.allowed_projects.clone(), normalize),
            allowed_zones: patch
                .allowed_zones
                .as_deref()
                .map_or_else(|| existing.allowed_zones.clone(), normalize),
            access_token_trusted_ips,
            access_token_ttl: patch.access_token_ttl.unwrap_or(existing.access_token_ttl),
            access_token_max_ttl: patch
                .access_token_max_ttl
                .unwrap_or(existing.access_token_max_ttl),
            access_token_num_uses_limit: patch
                .access_token_num_uses_limit
                .unwrap_or(existing.access_token_num_uses_limit),
            updated_at: self.clock.now(),
            ..existing
        };

        validate_token_limits(
            merged.access_token_ttl,
            merged.access_token_max_ttl,
            merged.access_token_num_uses_limit,
        )?;

        self.deps
            .configs
            .update(&merged)
            .await?
            .ok_or(GcpAuthError::ConfigurationNotFound)
    }

    /// Read an identity's GCP auth configuration.
    #[instrument(skip_all, fields(identity = %hash_for_correlation(&identity_id.to_string())))]
    pub async fn get(
        &self,
        actor: &ActorContext,
        identity_id: Uuid,
        request: &RequestInfo,
    ) -> Result<IdentityGcpAuth, GcpAuthError> {
        let result: Result<IdentityGcpAuth, GcpAuthError> = async {
            self.authorize(actor, identity_id, IdentityAction::Read)
                .await?;
            self.deps
                .configs
                .find_by_identity(identity_id)
                .await?
                .ok_or(GcpAuthError::ConfigurationNotFound)
        }
        .await;

        self.finish_config_operation(
            "get",
            AuditEventType::GetIdentityGcpAuth,
            actor,
            identity_id,
            request,
            result,
        )
        .await
    }

    async fn authorize(
        &self,
        actor: &ActorContext,
        identity_id: Uuid,
        action: IdentityAction,
    ) -> Result<Identity, GcpAuthError> {
        let identity = self
            .deps
            .identities
            .find_identity(identity_id)
            .await?
            .ok_or_else(|| {
                GcpAuthError::NotFound(format!("Identity with ID {} not found", identity_id))
            })?;

        self.deps
            .permissions
            .ensure_permitted(actor, &identity, action)
            .await?;
        Ok(identity)
    }

    async fn finish_config_operation(
        &self,
        operation: &'static str,
        event_type: AuditEventType,
        actor: &ActorContext,
        identity_id: Uuid,
        request: &RequestInfo,
        result: Result<IdentityGcpAuth, GcpAuthError>,
    ) -> Result<IdentityGcpAuth, GcpAuthError> {
        match &result {
            Ok(config) => {
                metrics::record_config_operation(operation, "success");
                tracing::info!(
                    target: "gcp_auth.service",
                    operation = operation,
                    auth_type = config.auth_type.as_str(),
                    "GCP auth configuration operation succeeded"
                );

                let metadata = match event_type {
                    AuditEventType::GetIdentityGcpAuth => json!({}),
                    _ => serde_json::to_value(config).unwrap_or_else(|_| json!({})),
                };
                self.emit_audit(AuditEvent {
                    event_type,
                    created_at: self.clock.now(),
                    org_id: Some(config.org_id),
                    identity_id,
                    actor: Some(*actor),
                    success: true,
                    failure_reason: None,
                    ip_address: request.ip_address.map(|ip| ip.to_string()),
                    user_agent: request.user_agent.clone(),
                    metadata,
                })
                .await;
            }
            Err(err) => {
                metrics::record_config_operation(operation, "error");
                record_operation_error(operation, err);
                tracing::warn!(
                    target: "gcp_auth.service",
                    operation = operation,
                    error = %err,
                    "GCP auth configuration operation failed"
                );
            }
        }
        result
    }

    // ========================================================================
    // Access token operations
    // ========================================================================

    /// Extend an identity access token by its configured TTL.
    ///
    /// The bearer string is returned unchanged; only the stored expiry moves.
    #[instrument(skip_all)]
    pub async fn renew_access_token(
        &self,
        access_token: &SecretString,
        request: &RequestInfo,
    ) -> Result<LoginOutcome, GcpAuthError> {
        let result = self.renew_inner(access_token).await;
        match &result {
            Ok((outcome, org_id)) => {
                metrics::record_token_use("renew", "success");
                self.emit_audit(AuditEvent {
                    event_type: AuditEventType::RenewIdentityAccessToken,
                    created_at: self.clock.now(),
                    org_id: Some(*org_id),
                    identity_id: outcome.token.identity_id,
                    actor: None,
                    success: true,
                    failure_reason: None,
                    ip_address: request.ip_address.map(|ip| ip.to_string()),
                    user_agent: request.user_agent.clone(),
                    metadata: json!({
                        "accessTokenId": outcome.token.id,
                        "expiresAt": outcome.token.expires_at,
                    }),
                })
                .await;
            }
            Err(err) => {
                metrics::record_token_use("renew", failure_reason(err));
                record_operation_error("renew", err);
                tracing::debug!(target: "gcp_auth.service", error = %err, "Access token renewal failed");
            }
        }
        result.map(|(outcome, _)| outcome)
    }

    async fn renew_inner(
        &self,
        access_token: &SecretString,
    ) -> Result<(LoginOutcome, Uuid), GcpAuthError> {
        let raw = access_token.expose_secret();
        let (claims, token) = self.load_identity_token(raw).await?;

        let config = self
            .deps
            .configs
            .find_by_identity(token.identity_id)
            .await?
            .filter(|c| c.id == token.configuration_id)
            .ok_or_else(invalid_access_token)?;

        let renewed = self.lifecycle.renew(&token, &config)?;
        let stored = self
            .deps
            .tokens
            .record_renewal(renewed.id, renewed.expires_at, renewed.last_renewed_at)
            .await?;
        if !stored {
            return Err(invalid_access_token());
        }

        let outcome = LoginOutcome {
            access_token: raw.to_string(),
            expires_in: seconds_until(renewed.expires_at, self.clock.now()),
            access_token_max_ttl: config.access_token_max_ttl,
            token: renewed,
        };
        Ok((outcome, claims.org_id))
    }

    /// Revoke an identity access token. Revoked tokens are unusable.
    #[instrument(skip_all)]
    pub async fn revoke_access_token(
        &self,
        access_token: &SecretString,
        request: &RequestInfo,
    ) -> Result<(), GcpAuthError> {
        let result: Result<(AccessTokenClaims, IssuedAccessToken), GcpAuthError> = async {
            let (claims, token) = self
                .load_identity_token(access_token.expose_secret())
                .await?;
            if !self.deps.tokens.revoke(token.id, self.clock.now()).await? {
                return Err(invalid_access_token());
            }
            Ok((claims, token))
        }
        .await;

        match result {
            Ok((claims, token)) => {
                metrics::record_token_use("revoke", "success");
                self.emit_audit(AuditEvent {
                    event_type: AuditEventType::RevokeIdentityAccessToken,
                    created_at: self.clock.now(),
                    org_id: Some(claims.org_id),
                    identity_id: token.identity_id,
                    actor: None,
                    success: true,
                    failure_reason: None,
                    ip_address: request.ip_address.map(|ip| ip.to_string()),
                    user_agent: request.user_agent.clone(),
                    metadata: json!({ "accessTokenId": token.id }),
                })
                .await;
                Ok(())
            }
            Err(err) => {
                metrics::record_token_use("revoke", failure_reason(&err));
                record_operation_error("revoke", &err);
                Err(err)
            }
        }
    }

    /// Resolve a bearer token to the acting principal.
    ///
    /// Identity access tokens spend one use. User session tokens are checked
    /// for signature and expiry only.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, bearer: &str) -> Result<ActorContext, GcpAuthError> {
        let claims = self.signer.verify(bearer, self.clock.now())?;

        match claims.auth_token_type {
            AuthTokenType::User => {
                let actor_id = Uuid::parse_str(&claims.sub).map_err(|_| invalid_access_token())?;
                Ok(ActorContext {
                    actor: ActorType::User,
                    actor_id,
                    actor_org_id: claims.org_id,
                    actor_auth_method: ActorAuthMethod::UserSession,
                })
            }
            AuthTokenType::IdentityAccessToken => {
                let result = self.consume(&claims).await;
                match &result {
                    Ok(_) => metrics::record_token_use("consume", "success"),
                    Err(err) => metrics::record_token_use("consume", failure_reason(err)),
                }
                let token = result?;
                Ok(ActorContext {
                    actor: ActorType::Identity,
                    actor_id: token.identity_id,
                    actor_org_id: claims.org_id,
                    actor_auth_method: ActorAuthMethod::GcpAuth,
                })
            }
        }
    }

    /// Spend one use with optimistic retry on the stored use count.
    async fn consume(&self, claims: &AccessTokenClaims) -> Result<IssuedAccessToken, GcpAuthError> {
        let token_id = parse_token_id(claims)?;

        for _ in 0..MAX_CONSUME_ATTEMPTS {
            let token = self.find_token(token_id, claims).await?;
            let next = self.lifecycle.consume(&token)?;
            if self
                .deps
                .tokens
                .compare_and_set_uses(token.id, token.uses_remaining, next.uses_remaining)
                .await?
            {
                return Ok(next);
            }
            tracing::debug!(target: "gcp_auth.service", "Lost use-count race, retrying");
        }

        tracing::warn!(
            target: "gcp_auth.service",
            attempts = MAX_CONSUME_ATTEMPTS,
            "Access token use-count contention exceeded retry budget"
        );
        Err(GcpAuthError::ServiceUnavailable(
            "Access token is under contention".to_string(),
        ))
    }

    /// Verify a bearer string and load its stored identity access token.
    async fn load_identity_token(
        &self,
        raw: &str,
    ) -> Result<(AccessTokenClaims, IssuedAccessToken), GcpAuthError> {
        let claims = self.signer.verify(raw, self.clock.now())?;
        if claims.auth_token_type != AuthTokenType::IdentityAccessToken {
            return Err(invalid_access_token());
        }
        let token_id = parse_token_id(&claims)?;
        let token = self.find_token(token_id, &claims).await?;
        Ok((claims, token))
    }

    async fn find_token(
        &self,
        token_id: Uuid,
        claims: &AccessTokenClaims,
    ) -> Result<IssuedAccessToken, GcpAuthError> {
        self.deps
            .tokens
            .find(token_id)
            .await?
            .filter(|token| token.identity_id.to_string() == claims.sub)
            .ok_or_else(invalid_access_token)
    }

    async fn emit_audit(&self, event: AuditEvent) {
        if let Err(e) = self.deps.audit.record(&event).await {
            tracing::warn!(
                target: "gcp_auth.audit",
                event_type = event.event_type.as_str(),
                error = %e,
                "Failed to record audit event"
            );
            metrics::record_audit_log_failure(event.event_type.as_str(), "sink_error");
        }
    }
}

/// Check TTL, max TTL and use limit together.
///
/// # Errors
///
/// Returns `GcpAuthError::ValidationError` describing the first violation.
pub fn validate_token_limits(
    ttl: i64,
    max_ttl: i64,
    num_uses_limit: i64,
) -> Result<(), GcpAuthError> {
    if ttl <= 0 {
        return Err(GcpAuthError::ValidationError(
            "accessTokenTTL must be greater than 0".to_string(),
        ));
    }
    if max_ttl <= 0 {
        return Err(GcpAuthError::ValidationError(
            "accessTokenMaxTTL must be greater than 0".to_string(),
        ));
    }
    if max_ttl > MAX_ACCESS_TOKEN_TTL_SECONDS {
        return Err(GcpAuthError::ValidationError(format!(
            "accessTokenMaxTTL must not exceed {}",
            MAX_ACCESS_TOKEN_TTL_SECONDS
        )));
    }
    if ttl > max_ttl {
        return Err(GcpAuthError::ValidationError(
            "accessTokenTTL cannot be greater than accessTokenMaxTTL".to_string(),
        ));
    }
    if num_uses_limit < 0 {
        return Err(GcpAuthError::ValidationError(
            "accessTokenNumUsesLimit must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn parse_token_id(claims: &AccessTokenClaims) -> Result<Uuid, GcpAuthError> {
    Uuid::parse_str(&claims.jti).map_err(|_| invalid_access_token())
}

fn invalid_access_token() -> GcpAuthError {
    GcpAuthError::InvalidToken("The access token is invalid or expired".to_string())
}

fn seconds_until(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (at - now).num_seconds().max(0)
}

fn record_operation_error(operation: &str, err: &GcpAuthError) {
    let category = ErrorCategory::from(err);
    metrics::record_error(operation, category.as_str(), err.status_code());
}

fn login_metadata(claims: &GcpIdentityClaims, token: &IssuedAccessToken) -> serde_json::Value {
    let mut metadata = json!({
        "identityGcpAuthId": token.configuration_id,
        "serviceAccountEmail": claims.service_account_email,
        "projectId": claims.project_id,
        "zone": claims.zone,
        "accessTokenId": token.id,
    });
    if let (ClaimSource::Gce { instance_id, instance_name }, Some(map)) =
        (&claims.source, metadata.as_object_mut())
    {
        map.insert("instanceId".to_string(), json!(instance_id));
        map.insert("instanceName".to_string(), json!(instance_name));
    }
    metadata
}
