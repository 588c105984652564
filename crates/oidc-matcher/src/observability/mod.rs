//! Observability for the matcher.
//!
//! Metrics go through the `metrics` facade; whichever recorder the host
//! process installs receives them. Nothing is recorded until one is installed.
//!
//! # Privacy by Default
//!
//! Tokens, subjects and issuer URLs never appear in metric labels. Labels are
//! bounded:
//! - `result`: hit, miss
//! - `status`: success, error
//! - `outcome`: matched, or a rejection kind
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `oidc_discovery_cache_total` | Counter | `result` |
//! | `oidc_discovery_fetch_total` | Counter | `status` |
//! | `oidc_discovery_fetch_duration_seconds` | Histogram | `status` |
//! | `oidc_jwks_refresh_total` | Counter | `status` |
//! | `oidc_jwks_refresh_duration_seconds` | Histogram | `status` |
//! | `oidc_match_total` | Counter | `outcome` |
//! | `oidc_match_duration_seconds` | Histogram | `outcome` |

pub mod metrics;

pub use self::metrics::{
    record_discovery_cache, record_discovery_fetch, record_jwks_refresh, record_match,
};
