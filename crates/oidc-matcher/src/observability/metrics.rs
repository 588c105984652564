//! Metric recording functions.
//!
//! All metrics follow Prometheus naming conventions:
//! - `oidc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! Label values are `&'static str` so recording never allocates.

use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// Discovery Metrics
// ============================================================================

/// Record an issuer cache lookup.
///
/// Metric: `oidc_discovery_cache_total`
/// Labels: `result` (hit, miss)
pub fn record_discovery_cache(result: &'static str) {
    counter!("oidc_discovery_cache_total", "result" => result).increment(1);
}

/// Record a discovery document fetch.
///
/// Metric: `oidc_discovery_fetch_total`, `oidc_discovery_fetch_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_discovery_fetch(status: &'static str, duration: Duration) {
    counter!("oidc_discovery_fetch_total", "status" => status).increment(1);
    histogram!("oidc_discovery_fetch_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}

// ============================================================================
// JWKS Metrics
// ============================================================================

/// Record a JWK Set fetch.
///
/// Metric: `oidc_jwks_refresh_total`, `oidc_jwks_refresh_duration_seconds`
/// Labels: `status` (success, error)
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    counter!("oidc_jwks_refresh_total", "status" => status).increment(1);
    histogram!("oidc_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Match Metrics
// ============================================================================

/// Record the result of one match attempt.
///
/// Metric: `oidc_match_total`, `oidc_match_duration_seconds`
/// Labels: `outcome`
///
/// Cardinality is bounded by the rejection kinds plus `matched`.
pub fn record_match(outcome: &'static str, duration: Duration) {
    counter!("oidc_match_total", "outcome" => outcome).increment(1);
    histogram!("oidc_match_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}
