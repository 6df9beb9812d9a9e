//! Utilities shared across the GCP auth crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT pre-validation utilities (size limits, header/claim peeking, time checks)
pub mod jwt;
