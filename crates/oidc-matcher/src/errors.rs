//! Error taxonomy for the matcher.
//!
//! Two kinds of failure are *expected* and never reach the caller of
//! [`TokenMatcher::matches`](crate::matcher::TokenMatcher::matches) as an
//! error: [`DiscoveryError`] (the issuer's key set could not be located) and
//! [`ValidationFailure`] (the token did not verify). Both collapse to a
//! non-match after being logged.
//!
//! [`MatcherError`] is the only error that propagates. It signals a
//! deployment defect such as an empty allow-list, not a bad credential.

use crate::config::ConfigError;
use common::jwt::JwtValidationError;
use thiserror::Error;

/// Failure to locate an issuer's signing-key set.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The token is not structurally a JWT.
    #[error("Token is malformed")]
    MalformedToken,

    /// The token exceeds the configured size limit.
    #[error("Token exceeds size limit")]
    TokenTooLarge,

    /// The token carries no usable `iss` claim.
    #[error("Token has no issuer claim")]
    MissingIssuer,

    /// The discovery document could not be fetched.
    #[error("Discovery fetch failed: {0}")]
    FetchFailed(String),

    /// The discovery document is not JSON or lacks `jwks_uri`.
    #[error("Malformed discovery document: {0}")]
    MalformedDocument(String),

    /// The `jwks_uri` value is not a valid URI.
    #[error("Invalid key set URI: {0}")]
    InvalidUri(String),
}

impl DiscoveryError {
    /// Bounded label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DiscoveryError::MalformedToken => "malformed_token",
            DiscoveryError::TokenTooLarge => "token_too_large",
            DiscoveryError::MissingIssuer => "missing_issuer",
            DiscoveryError::FetchFailed(_) => "fetch_failed",
            DiscoveryError::MalformedDocument(_) => "malformed_document",
            DiscoveryError::InvalidUri(_) => "invalid_uri",
        }
    }
}

impl From<JwtValidationError> for DiscoveryError {
    fn from(err: JwtValidationError) -> Self {
        match err {
            JwtValidationError::TokenTooLarge => DiscoveryError::TokenTooLarge,
            JwtValidationError::MissingIssuer => DiscoveryError::MissingIssuer,
            JwtValidationError::MalformedToken | JwtValidationError::IatTooFarInFuture => {
                DiscoveryError::MalformedToken
            }
        }
    }
}

/// Reason a token failed signature or claims validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("Token is malformed")]
    MalformedToken,

    #[error("Signing algorithm is not accepted")]
    UnsupportedAlgorithm,

    #[error("No matching key in the issuer's key set")]
    KeyNotFound,

    #[error("Key set unavailable: {0}")]
    KeySetUnavailable(String),

    #[error("Signature verification failed")]
    BadSignature,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not yet valid")]
    NotYetValid,

    #[error("Token issued in the future")]
    IssuedInFuture,

    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    #[error("Audience not allowed")]
    AudienceMismatch,

    #[error("Issuer not allowed")]
    IssuerMismatch,
}

impl ValidationFailure {
    /// Bounded label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationFailure::MalformedToken => "malformed_token",
            ValidationFailure::UnsupportedAlgorithm => "unsupported_algorithm",
            ValidationFailure::KeyNotFound => "key_not_found",
            ValidationFailure::KeySetUnavailable(_) => "key_set_unavailable",
            ValidationFailure::BadSignature => "bad_signature",
            ValidationFailure::Expired => "expired",
            ValidationFailure::NotYetValid => "not_yet_valid",
            ValidationFailure::IssuedInFuture => "issued_in_future",
            ValidationFailure::MissingClaim(_) => "missing_claim",
            ValidationFailure::AudienceMismatch => "audience_mismatch",
            ValidationFailure::IssuerMismatch => "issuer_mismatch",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ValidationFailure {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => ValidationFailure::BadSignature,
            ErrorKind::ExpiredSignature => ValidationFailure::Expired,
            ErrorKind::ImmatureSignature => ValidationFailure::NotYetValid,
            ErrorKind::InvalidAudience => ValidationFailure::AudienceMismatch,
            ErrorKind::InvalidIssuer => ValidationFailure::IssuerMismatch,
            ErrorKind::MissingRequiredClaim(claim) => {
                ValidationFailure::MissingClaim(claim.clone())
            }
            ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => {
                ValidationFailure::UnsupportedAlgorithm
            }
            _ => ValidationFailure::MalformedToken,
        }
    }
}

/// Fault that propagates out of the matcher instead of collapsing to `false`.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
