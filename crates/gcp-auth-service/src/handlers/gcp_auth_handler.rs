//! GCP auth login and configuration-management handlers.

use crate::errors::GcpAuthError;
use crate::handlers::request_info;
use crate::models::{
    ActorContext, AttachGcpAuthRequest, GcpAuthResponse, LoginRequest, TokenResponse,
    UpdateGcpAuthRequest,
};
use crate::routes::AppState;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    Extension, Json,
};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Handler for POST /api/v1/gcp-auth/login
///
/// Exchanges a GCP identity token for an access token. Unauthenticated.
pub async fn login(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, GcpAuthError> {
    let info = request_info(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_for,
    );

    let outcome = state
        .service
        .login(payload.identity_id, &payload.jwt, &info)
        .await?;

    Ok(Json(TokenResponse {
        access_token: outcome.access_token,
        token_type: "Bearer".to_string(),
        expires_in: outcome.expires_in,
        access_token_max_ttl: outcome.access_token_max_ttl,
    }))
}

/// Handler for POST /api/v1/gcp-auth/identities/:identity_id
pub async fn attach_gcp_auth(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<ActorContext>,
    Path(identity_id): Path<Uuid>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<AttachGcpAuthRequest>,
) -> Result<Json<GcpAuthResponse>, GcpAuthError> {
    let info = request_info(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_for,
    );

    let config = state
        .service
        .attach(&actor, identity_id, payload, &info)
        .await?;

    Ok(Json(GcpAuthResponse {
        identity_gcp_auth: config,
    }))
}

/// Handler for PATCH /api/v1/gcp-auth/identities/:identity_id
pub async fn update_gcp_auth(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<ActorContext>,
    Path(identity_id): Path<Uuid>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(payload): Json<UpdateGcpAuthRequest>,
) -> Result<Json<GcpAuthResponse>, GcpAuthError> {
    let info = request_info(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_for,
    );

    let config = state
        .service
        .update(&actor, identity_id, payload, &info)
        .await?;

    Ok(Json(GcpAuthResponse {
        identity_gcp_auth: config,
    }))
}

/// Handler for GET /api/v1/gcp-auth/identities/:identity_id
pub async fn get_gcp_auth(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<ActorContext>,
    Path(identity_id): Path<Uuid>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<Json<GcpAuthResponse>, GcpAuthError> {
    let info = request_info(
        &headers,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_for,
    );

    let config = state.service.get(&actor, identity_id, &info).await?;

    Ok(Json(GcpAuthResponse {
        identity_gcp_auth: config,
    }))
}
