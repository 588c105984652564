//! JWT utilities shared by the matcher crates.
//!
//! This module provides the pieces of JWT handling that happen *before* or
//! *beside* signature verification:
//! - Size limits for DoS prevention
//! - Clock skew constants for iat validation
//! - Issuer extraction from an unverified token
//! - Issuer normalization (trailing slash)
//! - iat validation logic
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - [`extract_issuer`] performs NO signature verification. The issuer it
//!   returns is routing information only and must never be trusted on its own.
//! - Generic error messages prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_issuer, normalize_issuer, validate_iat, DEFAULT_CLOCK_SKEW};
//!
//! // Find out who claims to have signed the token
//! let issuer = extract_issuer(token)?;
//! let cache_key = normalize_issuer(&issuer);
//!
//! // After signature verification, validate iat
//! validate_iat(claims.iat, DEFAULT_CLOCK_SKEW)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Hard ceiling on JWT size in bytes (64KB).
///
/// JWTs larger than this are rejected BEFORE any base64 decoding or JSON
/// parsing, whatever limit the caller configures. It matches the largest
/// request header common proxies forward.
pub const MAX_JWT_SIZE_BYTES: usize = 65_536; // 64KB

/// Default JWT size limit in bytes (16KB).
///
/// Identity-provider tokens carrying large `groups` or role claims routinely
/// exceed 8KB, so the default sits above that and below [`MAX_JWT_SIZE_BYTES`].
pub const DEFAULT_JWT_SIZE_BYTES: usize = 16_384; // 16KB

/// Default JWT clock skew tolerance (5 minutes per NIST SP 800-63B).
///
/// Applied as leeway to `exp`/`nbf` and as the maximum distance an `iat`
/// may lie in the future.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed JWT clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT.
///
/// Note: Error messages are intentionally generic to prevent information leakage.
/// Detailed information is logged at debug level for troubleshooting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token claims carry no usable `iss` value.
    #[error("The access token is invalid or expired")]
    MissingIssuer,

    /// Token `iat` claim is too far in the future.
    #[error("The access token is invalid or expired")]
    IatTooFarInFuture,
}

// =============================================================================
// Functions
// =============================================================================

/// Decode the claims segment of a JWT without verifying anything.
///
/// Only the structure is checked: three dot-separated segments, a base64url
/// payload, and a JSON object inside it. Signature, `exp`, `aud` and every
/// other reserved claim are ignored.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedToken` - Wrong segment count, bad base64url, or the payload is
///   not a JSON object
pub fn decode_claims_unverified(token: &str) -> Result<Map<String, Value>, JwtValidationError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT payload base64");
        JwtValidationError::MalformedToken
    })?;

    match serde_json::from_slice::<Value>(&payload_bytes) {
        Ok(Value::Object(claims)) => Ok(claims),
        Ok(_) => {
            tracing::debug!(target: "common.jwt", "JWT payload is not a JSON object");
            Err(JwtValidationError::MalformedToken)
        }
        Err(e) => {
            tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT payload JSON");
            Err(JwtValidationError::MalformedToken)
        }
    }
}

/// Extract the `iss` claim from a JWT without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - This function does NOT validate the token signature
/// - The issuer may only be used to locate the issuer's published key set;
///   the token MUST still be verified against that key set
///
/// # Errors
///
/// - `TokenTooLarge` / `MalformedToken` - see [`decode_claims_unverified`]
/// - `MissingIssuer` - `iss` is absent, not a string, or empty
pub fn extract_issuer(token: &str) -> Result<String, JwtValidationError> {
    let claims = decode_claims_unverified(token)?;

    // Reject empty and slash-only values, they cannot name an issuer
    claims
        .get("iss")
        .and_then(Value::as_str)
        .filter(|iss| !normalize_issuer(iss).is_empty())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingIssuer)
}

/// Strip a single trailing `/` from an issuer identifier.
///
/// `https://idp.example/` and `https://idp.example` name the same issuer.
/// Only one slash is removed, so `https://idp.example//` stays distinct.
#[must_use]
pub fn normalize_issuer(issuer: &str) -> &str {
    issuer.strip_suffix('/').unwrap_or(issuer)
}

/// Validate the `iat` (issued-at) claim with clock skew tolerance.
///
/// Rejects tokens with `iat` too far in the future, which could indicate:
/// - Token pre-generation attack
/// - Clock synchronization issues
/// - Token manipulation
///
/// # Errors
///
/// Returns `JwtValidationError::IatTooFarInFuture` if the iat timestamp is more than
/// `clock_skew` in the future.
pub fn validate_iat(iat: i64, clock_skew: Duration) -> Result<(), JwtValidationError> {
    let now = chrono::Utc::now().timestamp();
    validate_iat_at(iat, clock_skew, now)
}

/// Deterministic `iat` validation against an explicit `now` timestamp.
///
/// Prefer [`validate_iat`] in production code. This variant exists so that
/// boundary conditions can be unit-tested without wall-clock dependence.
pub(crate) fn validate_iat_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: clock_skew is bounded to MAX_CLOCK_SKEW (600 seconds), well within i64 range
    #[allow(clippy::cast_possible_wrap)]
    let clock_skew_secs = clock_skew.as_secs() as i64;
    let max_iat = now.saturating_add(clock_skew_secs);

    if iat > max_iat {
        tracing::debug!(
            target: "common.jwt",
            iat = iat,
            now = now,
            max_allowed = max_iat,
            clock_skew_secs = clock_skew_secs,
            "Token rejected: iat too far in the future"
        );
        return Err(JwtValidationError::IatTooFarInFuture);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
