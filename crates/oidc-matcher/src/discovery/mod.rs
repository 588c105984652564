//! OpenID Connect discovery: locating an issuer's signing keys.
//!
//! # Components
//!
//! - `cache` - TTL cache from issuer to key-set URI
//! - `resolver` - unverified issuer extraction and discovery fetch

pub mod cache;
pub mod resolver;

pub use cache::{IssuerCache, KeySetUri};
pub use resolver::IssuerKeySetResolver;
