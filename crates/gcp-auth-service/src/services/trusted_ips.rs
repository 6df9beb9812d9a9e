//! Trusted source-IP ranges for access-token issuance.

use crate::errors::GcpAuthError;
use crate::models::{TrustedIp, TrustedIpInput};
use ipnet::IpNet;
use std::net::IpAddr;

/// Parse one submitted range. A bare address becomes a host range.
///
/// # Errors
///
/// Returns `GcpAuthError::ValidationError` if the value is neither a CIDR
/// range nor an IP address.
pub fn parse_trusted_ip(raw: &str) -> Result<TrustedIp, GcpAuthError> {
    let trimmed = raw.trim();

    let ip_address = match trimmed.parse::<IpNet>() {
        Ok(net) => net.trunc(),
        Err(_) => trimmed
            .parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(|_| {
                GcpAuthError::ValidationError(format!(
                    "The IP is not a valid IPv4, IPv6, or CIDR block: {}",
                    trimmed
                ))
            })?,
    };

    Ok(TrustedIp { ip_address })
}

/// Parse a submitted list, requiring at least one entry.
///
/// # Errors
///
/// Returns `GcpAuthError::ValidationError` for an empty list or any bad entry.
pub fn parse_trusted_ips(inputs: &[TrustedIpInput]) -> Result<Vec<TrustedIp>, GcpAuthError> {
    if inputs.is_empty() {
        return Err(GcpAuthError::ValidationError(
            "accessTokenTrustedIps must contain at least one entry".to_string(),
        ));
    }

    inputs
        .iter()
        .map(|input| parse_trusted_ip(&input.ip_address))
        .collect()
}

/// True if `source` falls in any trusted range.
///
/// An unknown source only passes when both full ranges are trusted.
pub fn is_trusted(trusted: &[TrustedIp], source: Option<IpAddr>) -> bool {
    match source {
        Some(ip) => {
            // Match IPv4-mapped IPv6 sources against IPv4 ranges too.
            let mapped = match ip {
                IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4),
                IpAddr::V4(_) => None,
            };
            trusted.iter().any(|range| {
                range.contains(&ip) || mapped.is_some_and(|v4| range.contains(&v4))
            })
        }
        None => {
            let any_v4 = trusted
                .iter()
                .any(|r| r.ip_address.prefix_len() == 0 && r.ip_address.addr().is_ipv4());
            let any_v6 = trusted
                .iter()
                .any(|r| r.ip_address.prefix_len() == 0 && r.ip_address.addr().is_ipv6());
            any_v4 && any_v6
        }
    }
}
