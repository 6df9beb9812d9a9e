//! Authorization gate for configuration management.
//!
//! The service asks a [`PermissionChecker`] before every attach, update and
//! get. The shipped checker only enforces organization membership; richer
//! role models plug in behind the same trait.

use crate::errors::GcpAuthError;
use crate::models::{ActorContext, Identity};
use async_trait::async_trait;

/// Action on a machine identity's auth configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityAction {
    Create,
    Edit,
    Read,
}

impl IdentityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityAction::Create => "create",
            IdentityAction::Edit => "edit",
            IdentityAction::Read => "read",
        }
    }
}

/// Decides whether an actor may perform an action on an identity.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    /// Returns `GcpAuthError::Forbidden` if the actor is not permitted.
    async fn ensure_permitted(
        &self,
        actor: &ActorContext,
        identity: &Identity,
        action: IdentityAction,
    ) -> Result<(), GcpAuthError>;
}

/// Permits any actor belonging to the identity's organization.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrgMembershipPermissionChecker;

#[async_trait]
impl PermissionChecker for OrgMembershipPermissionChecker {
    async fn ensure_permitted(
        &self,
        actor: &ActorContext,
        identity: &Identity,
        action: IdentityAction,
    ) -> Result<(), GcpAuthError> {
        if actor.actor_org_id == identity.org_id {
            return Ok(());
        }
        tracing::debug!(
            target: "gcp_auth.permissions",
            action = action.as_str(),
            "Actor is not a member of the identity's organization"
        );
        Err(GcpAuthError::Forbidden(format!(
            "Not allowed to {} this identity",
            action.as_str()
        )))
    }
}

pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Checker with a fixed answer.
    #[derive(Debug)]
    pub struct MockPermissionChecker {
        allow: AtomicBool,
        call_count: AtomicUsize,
    }

    impl MockPermissionChecker {
        pub fn allow_all() -> Self {
            Self {
                allow: AtomicBool::new(true),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn deny_all() -> Self {
            Self {
                allow: AtomicBool::new(false),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn set_allow(&self, allow: bool) {
            self.allow.store(allow, Ordering::SeqCst);
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionChecker for MockPermissionChecker {
        async fn ensure_permitted(
            &self,
            _actor: &ActorContext,
            _identity: &Identity,
            action: IdentityAction,
        ) -> Result<(), GcpAuthError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            if self.allow.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(GcpAuthError::Forbidden(format!(
                    "Not allowed to {} this identity",
                    action.as_str()
                )))
            }
        }
    }
}
