use gcp_auth_service::auth::google::GoogleClaimVerifier;
use gcp_auth_service::clock::{Clock, SystemClock};
use gcp_auth_service::config::{decode_signing_seed, Config};
use gcp_auth_service::crypto::TokenSigner;
use gcp_auth_service::observability::metrics::init_metrics_recorder;
use gcp_auth_service::repositories::{
    PgAccessTokenRepository, PgAuditSink, PgGcpAuthRepository, PgIdentityDirectory,
};
use gcp_auth_service::routes::{self, AppState};
use gcp_auth_service::services::permissions::OrgMembershipPermissionChecker;
use gcp_auth_service::services::{GcpAuthDependencies, GcpAuthService};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gcp_auth_service=debug,gcp_auth=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting GCP Auth Service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        attach_policy = ?config.attach_policy,
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        "Configuration loaded successfully"
    );

    // Must run before any metric is recorded
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    info!("Connecting to database...");
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run database migrations: {}", e);
            e
        })?;

    info!("Database connection established");

    let seed = decode_signing_seed(&config.signing_key_seed)?;
    let signer = Arc::new(TokenSigner::from_seed(&seed, config.clock_skew())?);
    info!(key_id = %signer.key_id(), "Access token signing key loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let deps = GcpAuthDependencies {
        configs: Arc::new(PgGcpAuthRepository::new(db_pool.clone())),
        tokens: Arc::new(PgAccessTokenRepository::new(db_pool.clone())),
        identities: Arc::new(PgIdentityDirectory::new(db_pool.clone())),
        permissions: Arc::new(OrgMembershipPermissionChecker),
        verifier: Arc::new(GoogleClaimVerifier::from_config(&config, clock.clone())),
        audit: Arc::new(PgAuditSink::new(db_pool)),
    };
    let service = Arc::new(GcpAuthService::new(
        deps,
        signer,
        clock,
        config.attach_policy,
    ));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    let state = Arc::new(AppState { service, config });
    let app = routes::build_routes(state, metrics_handle);

    info!("GCP Auth Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("GCP Auth Service shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
