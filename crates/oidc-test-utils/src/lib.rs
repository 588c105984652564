//! # OIDC Test Utilities
//!
//! Shared test utilities for the OIDC matcher.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed Ed25519 keys, JWK rendering, signing)
//! - Test data builders (`TestTokenBuilder`)
//! - A mock identity provider serving discovery and JWKS documents
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oidc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let idp = MockIdp::start().await;
//!     let keypair = TestKeypair::new(1, "key-1");
//!     idp.mount_discovery().await;
//!     idp.mount_jwks(&[&keypair]).await;
//!
//!     let token = keypair.sign(&TestTokenBuilder::new(&idp.issuer()).build());
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_idp;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_idp::*;
pub use token_builders::*;
