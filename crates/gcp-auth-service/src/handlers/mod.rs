//! HTTP request handlers for the GCP auth service.

pub mod gcp_auth_handler;
pub mod health;
pub mod metrics;
pub mod token_handler;

pub use gcp_auth_handler::{attach_gcp_auth, get_gcp_auth, login, update_gcp_auth};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use token_handler::{renew_access_token, revoke_access_token};

use crate::models::RequestInfo;
use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Build audit/IP-check request metadata.
///
/// The first `X-Forwarded-For` entry is used only when `trust_forwarded_for`
/// is set; otherwise the peer address is authoritative.
pub fn request_info(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> RequestInfo {
    let forwarded = if trust_forwarded_for {
        headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok())
    } else {
        None
    };

    RequestInfo {
        ip_address: forwarded.or_else(|| peer.map(|addr| addr.ip())),
        user_agent: headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string()),
    }
}
