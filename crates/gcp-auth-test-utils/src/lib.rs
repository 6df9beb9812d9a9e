//! # GCP Auth Test Utilities
//!
//! Shared test utilities for the GCP auth service.
//!
//! This crate provides:
//! - Deterministic Ed25519 fixtures and JWKS documents (`crypto_fixtures`)
//! - Google-shaped IAM and GCE identity token builders (`token_builders`)
//! - Fixed test IDs (`test_ids`)
//! - An in-process server harness on in-memory storage (`server_harness`)
//! - Token and error-body assertions (`assertions`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gcp_auth_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestGcpAuthServer::spawn().await?;
//!     let response = reqwest::get(format!("{}/health", server.url())).await?;
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod server_harness;
pub mod test_ids;
pub mod token_builders;

pub use assertions::*;
pub use crypto_fixtures::*;
pub use server_harness::*;
pub use test_ids::*;
pub use token_builders::*;
