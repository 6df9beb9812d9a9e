//! Allow-list matching for verified GCP identity attributes.
//!
//! Administrators configure three comma-separated lists on an identity:
//! service accounts, projects and zones. Each entry is either a literal or a
//! `*` glob. An empty list (or one containing a bare `*`) allows anything.

use crate::auth::claims::GcpIdentityClaims;
use crate::errors::GcpAuthError;
use crate::models::IdentityGcpAuth;
use std::fmt;

/// Which allow-list rejected a claim.
///
/// Logged server-side only; never part of a client response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowListField {
    ServiceAccount,
    Project,
    Zone,
}

impl AllowListField {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllowListField::ServiceAccount => "service_account",
            AllowListField::Project => "project",
            AllowListField::Zone => "zone",
        }
    }
}

impl fmt::Display for AllowListField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowListEntry {
    Literal(String),
    Glob(String),
}

impl AllowListEntry {
    fn matches(&self, value: &str) -> bool {
        match self {
            AllowListEntry::Literal(literal) => literal == value,
            AllowListEntry::Glob(pattern) => wildcard_match(pattern, value),
        }
    }
}

/// Parsed form of a stored allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowListPattern {
    AllowAny,
    Entries(Vec<AllowListEntry>),
}

impl AllowListPattern {
    /// Parse a stored comma-separated list.
    pub fn parse(list: &str) -> Self {
        let mut entries = Vec::new();
        for raw in list.split(',') {
            let entry = raw.trim();
            if entry.is_empty() {
                continue;
            }
            if entry == "*" {
                return AllowListPattern::AllowAny;
            }
            if entry.contains('*') {
                entries.push(AllowListEntry::Glob(entry.to_string()));
            } else {
                entries.push(AllowListEntry::Literal(entry.to_string()));
            }
        }

        if entries.is_empty() {
            AllowListPattern::AllowAny
        } else {
            AllowListPattern::Entries(entries)
        }
    }

    /// Check an attribute. An absent attribute only passes `AllowAny`.
    pub fn allows(&self, value: Option<&str>) -> bool {
        match (self, value) {
            (AllowListPattern::AllowAny, _) => true,
            (AllowListPattern::Entries(_), None) => false,
            (AllowListPattern::Entries(entries), Some(value)) => {
                entries.iter().any(|entry| entry.matches(value))
            }
        }
    }
}

/// Returns true if `value` is allowed by the comma-separated `list`.
pub fn matches(list: &str, value: Option<&str>) -> bool {
    AllowListPattern::parse(list).allows(value)
}

/// Normalize a submitted list for storage: entries trimmed, empties dropped,
/// joined with `", "`.
pub fn normalize(list: &str) -> String {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check verified claims against a configuration's allow-lists.
///
/// Order is service account, project, zone; the first mismatch wins.
///
/// # Errors
///
/// Returns `GcpAuthError::ClaimNotAuthorized` naming the failing field.
pub fn authorize_claims(
    config: &IdentityGcpAuth,
    claims: &GcpIdentityClaims,
) -> Result<(), GcpAuthError> {
    let checks = [
        (
            AllowListField::ServiceAccount,
            config.allowed_service_accounts.as_str(),
            Some(claims.service_account_email.as_str()),
        ),
        (
            AllowListField::Project,
            config.allowed_projects.as_str(),
            claims.project_id.as_deref(),
        ),
        (
            AllowListField::Zone,
            config.allowed_zones.as_str(),
            claims.zone.as_deref(),
        ),
    ];

    for (field, list, value) in checks {
        if !matches(list, value) {
            tracing::debug!(
                target: "gcp_auth.allow_list",
                field = %field,
                "Claim rejected by allow-list"
            );
            return Err(GcpAuthError::ClaimNotAuthorized { field });
        }
    }

    Ok(())
}

/// Glob match where `*` matches any run of characters (including none).
pub fn wildcard_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let pattern = pattern.as_bytes();
    let value = value.as_bytes();
    let (mut p_idx, mut v_idx) = (0usize, 0usize);
    let (mut star_idx, mut match_idx) = (None, 0usize);

    while let Some(&v) = value.get(v_idx) {
        match pattern.get(p_idx) {
            Some(b'*') => {
                star_idx = Some(p_idx);
                match_idx = v_idx;
                p_idx += 1;
            }
            Some(&p) if p == v => {
                p_idx += 1;
                v_idx += 1;
            }
            _ => match star_idx {
                Some(star) => {
                    p_idx = star + 1;
                    match_idx += 1;
                    v_idx = match_idx;
                }
                None => return false,
            },
        }
    }

    while pattern.get(p_idx) == Some(&b'*') {
        p_idx += 1;
    }

    p_idx == pattern.len()
}
