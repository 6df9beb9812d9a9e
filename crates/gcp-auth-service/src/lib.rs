//! GCP Auth Service Library
//!
//! Machine-identity authentication for GCP workloads. A GCP IAM service
//! account or GCE instance exchanges a Google-signed identity token for a
//! short-lived access token whose TTL, renewal horizon and use count are
//! enforced by this service.
//!
//! # Architecture
//!
//! Handler -> Service -> Repository:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Claim verification against Google JWKS
//! - `clock` - Injected time source
//! - `config` - Service configuration from environment
//! - `crypto` - Access token signing
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Bearer auth and HTTP metrics
//! - `models` - Data models
//! - `observability` - Metrics and log-field hashing
//! - `repositories` - Storage traits with PostgreSQL and in-memory adapters
//! - `routes` - Axum router setup
//! - `services` - Login orchestration, allow-lists, token lifecycle

pub mod auth;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
