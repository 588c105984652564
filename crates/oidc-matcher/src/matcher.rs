//! Token matcher.
//!
//! Decides whether a presented JWT matches a stored credential: the strings
//! must be identical AND the token must verify against the signing keys its
//! issuer publishes.
//!
//! # Security
//!
//! - A token that differs from the stored credential is rejected before any
//!   network or cryptographic work
//! - The unverified issuer is checked against the allow-list before it is
//!   used to build a discovery URL
//! - Only asymmetric algorithms are accepted; HMAC tokens cannot be verified
//!   against a public key set
//! - Tokens above the configured size limit are rejected before decoding
//! - `exp`, `iat`, `sub`, `iss` and `aud` are all required
//! - Rejection reasons are logged but never returned to the caller

use crate::claims::Claims;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ValidationPolicy};
use crate::discovery::{IssuerCache, IssuerKeySetResolver};
use crate::errors::{DiscoveryError, MatcherError, ValidationFailure};
use crate::jwks::KeySetRegistry;
use crate::observability::metrics;
use common::jwt::{extract_issuer, validate_iat, DEFAULT_JWT_SIZE_BYTES};
use common::secret::CredentialKey;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Signature algorithms a token may use.
const ACCEPTED_ALGORITHMS: [Algorithm; 9] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::EdDSA,
];

/// Registered claims `jsonwebtoken` enforces presence of. `iat` is checked separately.
const REQUIRED_SPEC_CLAIMS: [&str; 4] = ["exp", "sub", "iss", "aud"];

/// Why a presented token did not match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Presented token differs from the stored credential.
    CredentialMismatch,

    /// The issuer's key set could not be located.
    Discovery(DiscoveryError),

    /// The token failed signature or claims validation.
    Validation(ValidationFailure),
}

impl RejectReason {
    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::CredentialMismatch => "credential_mismatch",
            RejectReason::Discovery(e) => e.kind(),
            RejectReason::Validation(e) => e.kind(),
        }
    }
}

impl From<DiscoveryError> for RejectReason {
    fn from(err: DiscoveryError) -> Self {
        RejectReason::Discovery(err)
    }
}

impl From<ValidationFailure> for RejectReason {
    fn from(err: ValidationFailure) -> Self {
        RejectReason::Validation(err)
    }
}

/// Result of one match attempt.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched(Claims),
    Rejected(RejectReason),
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::Matched(_))
    }

    fn label(&self) -> &'static str {
        match self {
            MatchOutcome::Matched(_) => "matched",
            MatchOutcome::Rejected(reason) => reason.kind(),
        }
    }
}

/// Build the HTTP client shared by discovery and JWKS fetches.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "oidc.matcher", error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        })
}

/// Matches presented JWTs against stored credentials.
pub struct TokenMatcher {
    resolver: IssuerKeySetResolver,
    key_sets: KeySetRegistry,
    clock_skew: Duration,
    max_token_bytes: usize,
}

impl TokenMatcher {
    /// Create a matcher from its collaborators.
    ///
    /// # Arguments
    ///
    /// * `resolver` - Issuer → key-set URI resolver
    /// * `key_sets` - Registry of per-URI JWKS clients
    /// * `clock_skew` - Leeway for `exp`/`nbf` and the `iat` future bound
    pub fn new(
        resolver: IssuerKeySetResolver,
        key_sets: KeySetRegistry,
        clock_skew: Duration,
    ) -> Self {
        Self {
            resolver,
            key_sets,
            clock_skew,
            max_token_bytes: DEFAULT_JWT_SIZE_BYTES,
        }
    }

    /// Override the largest token accepted, in bytes.
    ///
    /// Values above [`common::jwt::MAX_JWT_SIZE_BYTES`] are still capped by
    /// the unverified decode.
    pub fn with_max_token_bytes(mut self, max_token_bytes: usize) -> Self {
        self.max_token_bytes = max_token_bytes;
        self
    }

    /// Create a matcher wired from configuration with the system clock.
    pub fn from_config(config: &Config) -> Self {
        let http_client = build_http_client(config.http_timeout());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let cache = Arc::new(IssuerCache::with_clock(
            config.discovery_cache_ttl(),
            Arc::clone(&clock),
        ));
        let resolver = IssuerKeySetResolver::new(http_client.clone(), cache);
        let key_sets = KeySetRegistry::new(http_client, config.jwks_cache_ttl(), clock);

        Self::new(resolver, key_sets, config.clock_skew())
            .with_max_token_bytes(config.jwt_max_size_bytes)
    }

    pub fn resolver(&self) -> &IssuerKeySetResolver {
        &self.resolver
    }

    pub fn key_sets(&self) -> &KeySetRegistry {
        &self.key_sets
    }

    /// Whether `presented` matches `stored` and verifies under `policy`.
    ///
    /// # Errors
    ///
    /// Returns `MatcherError::Config` only when `policy` is malformed. Every
    /// credential problem is `Ok(false)`.
    pub async fn matches(
        &self,
        presented: &str,
        stored: &CredentialKey,
        policy: &ValidationPolicy,
    ) -> Result<bool, MatcherError> {
        Ok(self.evaluate(presented, stored, policy).await?.is_match())
    }

    /// Like [`Self::matches`], but keeps the claims or rejection reason.
    ///
    /// # Errors
    ///
    /// Returns `MatcherError::Config` when `policy` is malformed.
    #[instrument(skip_all)]
    pub async fn evaluate(
        &self,
        presented: &str,
        stored: &CredentialKey,
        policy: &ValidationPolicy,
    ) -> Result<MatchOutcome, MatcherError> {
        policy.validate()?;

        if !stored.matches(presented) {
            tracing::debug!(target: "oidc.matcher", "Presented token does not equal stored credential");
            let outcome = MatchOutcome::Rejected(RejectReason::CredentialMismatch);
            metrics::record_match(outcome.label(), Duration::ZERO);
            return Ok(outcome);
        }

        let start = Instant::now();
        let outcome = match self.verify(presented, policy).await {
            Ok(claims) => {
                tracing::debug!(target: "oidc.matcher", iss = ?claims.iss, "Token matched");
                MatchOutcome::Matched(claims)
            }
            Err(reason) => {
                tracing::warn!(
                    target: "oidc.matcher",
                    reason = reason.kind(),
                    detail = ?reason,
                    "Error while validating JWT credentials"
                );
                MatchOutcome::Rejected(reason)
            }
        };
        metrics::record_match(outcome.label(), start.elapsed());

        Ok(outcome)
    }

    /// Full verification of a token already known to equal the stored credential.
    async fn verify(&self, token: &str, policy: &ValidationPolicy) -> Result<Claims, RejectReason> {
        if token.len() > self.max_token_bytes {
            tracing::debug!(
                target: "oidc.matcher",
                size = token.len(),
                max_size = self.max_token_bytes,
                "Token rejected: size exceeds maximum"
            );
            return Err(DiscoveryError::TokenTooLarge.into());
        }

        let issuer = extract_issuer(token).map_err(DiscoveryError::from)?;

        // Refuse to run discovery against an issuer we would reject anyway
        if !policy.allows_issuer(&issuer) {
            tracing::info!(target: "oidc.matcher", issuer = %issuer, "Token issuer not in allow-list");
            return Err(ValidationFailure::IssuerMismatch.into());
        }

        let jwks_uri = self.resolver.resolve_issuer(&issuer).await.map_err(|e| {
            tracing::warn!(target: "oidc.matcher", issuer = %issuer, error = %e, "Cannot get JSON Web Key Set URI");
            e
        })?;
        self.release_retired_key_sets().await;

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "oidc.matcher", error = %e, "Failed to decode JWT header");
            ValidationFailure::MalformedToken
        })?;

        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            tracing::warn!(target: "oidc.matcher", alg = ?header.alg, "Unsupported JWT algorithm");
            return Err(ValidationFailure::UnsupportedAlgorithm.into());
        }

        let jwks_client = self.key_sets.client_for(&jwks_uri).await;
        let jwk = jwks_client.get_key(header.kid.as_deref()).await?;

        let decoding_key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            tracing::warn!(target: "oidc.matcher", error = %e, kid = ?jwk.common.key_id, "Unusable JWK");
            ValidationFailure::from(e)
        })?;

        let claims = decode::<Claims>(token, &decoding_key, &self.validation(header.alg, policy))
            .map_err(|e| {
                tracing::debug!(target: "oidc.matcher", error = %e, "Token verification failed");
                ValidationFailure::from(e)
            })?
            .claims;

        let iat = claims
            .iat
            .ok_or_else(|| ValidationFailure::MissingClaim("iat".to_string()))?;
        validate_iat(iat, self.clock_skew).map_err(|_| ValidationFailure::IssuedInFuture)?;

        // Signed issuer must still be allowed (same value as the unverified one)
        if !claims.iss.as_deref().is_some_and(|iss| policy.allows_issuer(iss)) {
            return Err(ValidationFailure::IssuerMismatch.into());
        }

        Ok(claims)
    }

    /// Drop JWKS clients whose URI no issuer maps to anymore.
    async fn release_retired_key_sets(&self) {
        for uri in self.resolver.cache().take_retired().await {
            if self.key_sets.remove(uri.as_str()).await {
                tracing::debug!(target: "oidc.matcher", uri = %uri, "Released JWKS client for retired key set");
            }
        }
    }

    /// Validation rules for one attempt.
    ///
    /// Issuer matching is done by the caller so trailing slashes are ignored.
    fn validation(&self, alg: Algorithm, policy: &ValidationPolicy) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_required_spec_claims(&REQUIRED_SPEC_CLAIMS);
        validation.set_audience(policy.allowed_audiences.as_slice());
        validation
    }
}
