//! Common utilities shared by the OIDC matcher crates.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (size limits, unverified issuer extraction, iat checks)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
