//! Liveness endpoint.

/// Handler for GET /health
///
/// Returns "OK" while the process is serving. Does not check dependencies.
pub async fn health_check() -> &'static str {
    "OK"
}
