//! Bearer authentication for configuration-management routes.
//!
//! Extracts the Bearer token from the Authorization header, resolves it to an
//! [`ActorContext`] through the service, and injects the context into request
//! extensions for handlers.

use crate::errors::GcpAuthError;
use crate::models::ActorContext;
use crate::services::GcpAuthService;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<GcpAuthService>,
}

/// Extract Bearer token from the Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, GcpAuthError> {
    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "gcp_auth.middleware.auth", "Missing Authorization header");
            GcpAuthError::InvalidToken("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "gcp_auth.middleware.auth", "Invalid Authorization header format");
        GcpAuthError::InvalidToken("Invalid Authorization header format".to_string())
    })
}

/// Authentication middleware.
///
/// Identity access tokens spend one use per authenticated request.
///
/// # Response
///
/// - 401 if the token is missing, invalid, expired or exhausted
/// - Continues with `ActorContext` in extensions otherwise
#[instrument(skip_all, name = "gcp_auth.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, GcpAuthError> {
    let token = extract_bearer_token(req.headers())?;
    let actor = state.service.authenticate(token).await?;

    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}

/// Convenience accessor for the authenticated actor.
pub trait ActorExt {
    /// `None` if the auth middleware did not run for this request.
    fn actor(&self) -> Option<&ActorContext>;
}

impl<B> ActorExt for axum::extract::Request<B> {
    fn actor(&self) -> Option<&ActorContext> {
        self.extensions().get::<ActorContext>()
    }
}
