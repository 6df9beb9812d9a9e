pub mod allow_list;
pub mod gcp_auth_service;
pub mod permissions;
pub mod token_lifecycle;
pub mod trusted_ips;

pub use gcp_auth_service::{GcpAuthDependencies, GcpAuthService, LoginOutcome};
