//! HTTP routes for the GCP auth service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::services::GcpAuthService;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<GcpAuthService>,
    pub config: Config,
}

/// Build the application routes.
///
/// - `/health` - Liveness check, public
/// - `/metrics` - Prometheus scrape endpoint, public
/// - `/api/v1/gcp-auth/login` - GCP identity token exchange, public
/// - `/api/v1/auth/token/renew`, `/api/v1/auth/token/revoke` - bearer in body
/// - `/api/v1/gcp-auth/identities/:identity_id` - attach/update/get, bearer required
///
/// Layers: request timeout (innermost), TraceLayer, HTTP metrics (outermost).
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        service: state.service.clone(),
    });
    let request_timeout = state.config.request_timeout;

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/v1/gcp-auth/login", post(handlers::login))
        .route("/api/v1/auth/token/renew", post(handlers::renew_access_token))
        .route("/api/v1/auth/token/revoke", post(handlers::revoke_access_token))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route(
            "/api/v1/gcp-auth/identities/:identity_id",
            post(handlers::attach_gcp_auth)
                .patch(handlers::update_gcp_auth)
                .get(handlers::get_gcp_auth),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        // Outermost so framework-level rejections are counted too
        .layer(middleware::from_fn(http_metrics_middleware))
}
