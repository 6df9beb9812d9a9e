//! Access token renew and revoke handlers.
//!
//! Both take the bearer string in the body, not the Authorization header, so
//! calling them never spends a use.

use crate::errors::GcpAuthError;
use crate::handlers::request_info;
use crate::models::{AccessTokenRequest, RevokeResponse, TokenResponse};
use crate::routes::AppState;
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Handler for POST /api/v1/auth/token/renew
pub async fn renew_access_token(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<AccessTokenRequest>,
) -> Result<Json<TokenResponse>, GcpAuthError> {
    let info = request_info(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_for,
    );

    let outcome = state
        .service
        .renew_access_token(&payload.access_token, &info)
        .await?;

    Ok(Json(TokenResponse {
        access_token: outcome.access_token,
        token_type: "Bearer".to_string(),
        expires_in: outcome.expires_in,
        access_token_max_ttl: outcome.access_token_max_ttl,
    }))
}

/// Handler for POST /api/v1/auth/token/revoke
pub async fn revoke_access_token(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<AccessTokenRequest>,
) -> Result<Json<RevokeResponse>, GcpAuthError> {
    let info = request_info(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_for,
    );

    state
        .service
        .revoke_access_token(&payload.access_token, &info)
        .await?;

    Ok(Json(RevokeResponse {
        message: "Successfully revoked access token".to_string(),
    }))
}
