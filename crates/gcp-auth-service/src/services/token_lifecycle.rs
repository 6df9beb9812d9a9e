//! Access token lifecycle rules.
//!
//! Pure state transitions over [`IssuedAccessToken`]; persistence and the
//! atomic use-count swap belong to the caller. Every time comparison goes
//! through the injected [`Clock`].

use crate::clock::Clock;
use crate::errors::GcpAuthError;
use crate::models::{IdentityGcpAuth, IssuedAccessToken};
use chrono::Duration;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Applies issue, renew and consume rules to access tokens.
#[derive(Clone)]
pub struct TokenLifecycleManager {
    clock: Arc<dyn Clock>,
}

impl TokenLifecycleManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Build a fresh token for a successful login.
    ///
    /// The initial lifetime is the configured TTL, capped at the max TTL.
    /// The max TTL horizon is fixed here and never moves afterwards.
    pub fn issue(
        &self,
        config: &IdentityGcpAuth,
        identity_id: Uuid,
        source_ip: Option<IpAddr>,
    ) -> IssuedAccessToken {
        let now = self.clock.now();
        let lifetime = config.access_token_ttl.min(config.access_token_max_ttl);
        let uses_remaining = match config.access_token_num_uses_limit {
            0 => None,
            limit => Some(limit),
        };

        IssuedAccessToken {
            id: Uuid::new_v4(),
            identity_id,
            configuration_id: config.id,
            issued_at: now,
            last_renewed_at: now,
            expires_at: now + Duration::seconds(lifetime),
            max_expires_at: now + Duration::seconds(config.access_token_max_ttl),
            uses_remaining,
            source_ip: source_ip.map(|ip| ip.to_string()),
            revoked_at: None,
        }
    }

    /// Extend a live token by one TTL from now.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` if revoked
    /// - `Expired` if already past `expires_at`
    /// - `Exhausted` if no uses remain
    /// - `MaxTTLExceeded` if the new expiry would pass the horizon fixed at
    ///   issue, or `issued_at + max_ttl` under the current configuration,
    ///   whichever is earlier
    pub fn renew(
        &self,
        token: &IssuedAccessToken,
        config: &IdentityGcpAuth,
    ) -> Result<IssuedAccessToken, GcpAuthError> {
        let now = self.clock.now();
        self.ensure_live(token)?;
        if token.uses_remaining == Some(0) {
            return Err(GcpAuthError::Exhausted);
        }

        let new_expiry = now + Duration::seconds(config.access_token_ttl);
        let horizon = token
            .max_expires_at
            .min(token.issued_at + Duration::seconds(config.access_token_max_ttl));
        if new_expiry > horizon {
            return Err(GcpAuthError::MaxTTLExceeded);
        }

        Ok(IssuedAccessToken {
            expires_at: new_expiry,
            last_renewed_at: now,
            ..token.clone()
        })
    }

    /// Spend one use of a token.
    ///
    /// Expiry and revocation are checked before the use count, so an expired
    /// token with uses left is still rejected as `Expired`.
    pub fn consume(&self, token: &IssuedAccessToken) -> Result<IssuedAccessToken, GcpAuthError> {
        self.ensure_live(token)?;
        let uses_remaining = match token.uses_remaining {
            None => None,
            Some(0) => return Err(GcpAuthError::Exhausted),
            Some(n) => Some(n - 1),
        };

        Ok(IssuedAccessToken {
            uses_remaining,
            ..token.clone()
        })
    }

    fn ensure_live(&self, token: &IssuedAccessToken) -> Result<(), GcpAuthError> {
        if token.revoked_at.is_some() {
            return Err(GcpAuthError::InvalidToken(
                "The access token has been revoked".to_string(),
            ));
        }
        if self.clock.now() > token.expires_at {
            return Err(GcpAuthError::Expired);
        }
        Ok(())
    }
}
