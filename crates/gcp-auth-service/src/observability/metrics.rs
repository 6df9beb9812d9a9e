//! Metrics definitions for the GCP auth service
//!
//! All metrics follow Prometheus naming conventions:
//! - `gcp_auth_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `auth_type`: 2 values (iam, gce)
//! - `status`: 2 values (success, error)
//! - `reason`: bounded by `observability::failure_reason`
//! - `operation`: bounded by code
//! - `table`: bounded by schema (4 tables)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    prometheus_builder()?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Builder with the service's histogram buckets, shared with test harnesses
/// that need an uninstalled recorder.
pub fn prometheus_builder() -> Result<PrometheusBuilder, String> {
    PrometheusBuilder::new()
        // Login includes a JWKS round-trip on cache miss
        .set_buckets_for_metric(
            Matcher::Prefix("gcp_auth_login".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set login buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gcp_auth_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("gcp_auth_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))
}

// ============================================================================
// Login Metrics
// ============================================================================

/// Record a login attempt
///
/// Metric: `gcp_auth_login_duration_seconds`, `gcp_auth_login_total`
/// Labels: `auth_type`, `status`, `reason`
pub fn record_login(auth_type: &str, status: &str, reason: &str, duration: Duration) {
    histogram!("gcp_auth_login_duration_seconds", "auth_type" => auth_type.to_string(), "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("gcp_auth_login_total",
        "auth_type" => auth_type.to_string(),
        "status" => status.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

// ============================================================================
// Configuration Metrics
// ============================================================================

/// Record a configuration management operation
///
/// Metric: `gcp_auth_config_operations_total`
/// Labels: `operation` (attach, update, get), `status`
pub fn record_config_operation(operation: &str, status: &str) {
    counter!("gcp_auth_config_operations_total", "operation" => operation.to_string(), "status" => status.to_string())
        .increment(1);
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record an access token operation
///
/// Metric: `gcp_auth_token_uses_total`
/// Labels: `operation` (consume, renew, revoke), `outcome`
pub fn record_token_use(operation: &str, outcome: &str) {
    counter!("gcp_auth_token_uses_total", "operation" => operation.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Record database query execution
///
/// Metric: `gcp_auth_db_query_duration_seconds`, `gcp_auth_db_queries_total`
/// Labels: `operation`, `table`, `status`
pub fn record_db_query(operation: &str, table: &str, status: &str, duration: Duration) {
    histogram!("gcp_auth_db_query_duration_seconds", "operation" => operation.to_string(), "table" => table.to_string())
        .record(duration.as_secs_f64());

    counter!("gcp_auth_db_queries_total",
        "operation" => operation.to_string(),
        "table" => table.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Audit Metrics
// ============================================================================

/// Record audit log failure
///
/// Metric: `gcp_auth_audit_log_failures_total`
/// Labels: `event_type`, `reason`
///
/// ALERT: Any non-zero value should page
pub fn record_audit_log_failure(event_type: &str, reason: &str) {
    counter!("gcp_auth_audit_log_failures_total", "event_type" => event_type.to_string(), "reason" => reason.to_string())
        .increment(1);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record error by category
///
/// Metric: `gcp_auth_errors_total`
/// Labels: `operation`, `error_category`, `status_code`
pub fn record_error(operation: &str, error_category: &str, status_code: u16) {
    counter!("gcp_auth_errors_total",
        "operation" => operation.to_string(),
        "error_category" => error_category.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gcp_auth_http_requests_total`, `gcp_auth_http_request_duration_seconds`
/// Labels: `method`, `path`, `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let normalized_path = normalize_path(path);

    histogram!("gcp_auth_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => normalized_path.clone(),
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gcp_auth_http_requests_total",
        "method" => method.to_string(),
        "path" => normalized_path,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Normalize path to prevent label cardinality explosion
fn normalize_path(path: &str) -> String {
    match path {
        "/health"
        | "/metrics"
        | "/api/v1/gcp-auth/login"
        | "/api/v1/auth/token/renew"
        | "/api/v1/auth/token/revoke" => path.to_string(),
        _ => match path.strip_prefix("/api/v1/gcp-auth/identities/") {
            Some(id) if uuid::Uuid::parse_str(id).is_ok() => {
                "/api/v1/gcp-auth/identities/{id}".to_string()
            }
            _ => "/other".to_string(),
        },
    }
}
