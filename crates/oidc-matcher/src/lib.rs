//! OIDC credential matcher.
//!
//! Decides whether a presented JWT matches a stored credential by exact
//! comparison followed by full verification against the signing keys the
//! token's issuer publishes through OpenID Connect discovery.
//!
//! # Flow
//!
//! ```text
//! matcher.rs -> discovery/resolver.rs -> discovery/cache.rs
//!            -> jwks.rs (KeySetRegistry -> JwksClient)
//!            -> jsonwebtoken::decode
//! ```
//!
//! # Modules
//!
//! - `config` - Allow-lists and cache/timeout settings from environment
//! - `discovery` - Issuer → key-set URI resolution and caching
//! - `jwks` - Signing-key fetching and caching per key-set URI
//! - `matcher` - The match decision
//! - `observability` - Metrics

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod claims;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod jwks;
pub mod matcher;
pub mod observability;

pub use claims::{Audience, Claims};
pub use config::{Config, ConfigError, ValidationPolicy};
pub use discovery::{IssuerCache, IssuerKeySetResolver, KeySetUri};
pub use errors::{DiscoveryError, MatcherError, ValidationFailure};
pub use jwks::{JwksClient, KeySetRegistry};
pub use matcher::{MatchOutcome, RejectReason, TokenMatcher};
