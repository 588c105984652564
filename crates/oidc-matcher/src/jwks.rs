//! JWKS client for fetching and caching an issuer's public keys.
//!
//! One [`JwksClient`] exists per key-set URI. It fetches the JWK Set on first
//! use, caches it for a configurable TTL, and refetches early when a token
//! names a `kid` the cached set does not contain, so key rotation at the
//! issuer is picked up without waiting for expiry.
//!
//! [`KeySetRegistry`] hands out the client for a URI, creating it on first
//! request.
//!
//! # Security
//!
//! - Keys are never cached past their TTL
//! - Unknown-`kid` refetches are rate limited per client
//! - HTTPS should be used in production (enforced by deployment config)

use crate::clock::{expires_after, Clock, SystemClock};
use crate::discovery::KeySetUri;
use crate::errors::ValidationFailure;
use crate::observability::metrics;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

/// Default cache TTL in seconds (5 minutes).
const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Minimum age of a cached key set before an unknown `kid` may trigger a refetch.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Cached JWKS data with fetch and expiry times.
struct CachedJwks {
    keys: Vec<Jwk>,
    fetched_at: Instant,
    expires_at: Instant,
}

/// JWKS client bound to a single key-set URI.
pub struct JwksClient {
    /// URL of the JWK Set document.
    jwks_uri: KeySetUri,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Cached JWKS data.
    cache: RwLock<Option<CachedJwks>>,

    /// Cache TTL duration.
    cache_ttl: Duration,

    clock: Arc<dyn Clock>,
}

impl JwksClient {
    /// Create a new JWKS client with the default TTL.
    pub fn new(jwks_uri: KeySetUri, http_client: reqwest::Client) -> Self {
        Self::with_ttl(
            jwks_uri,
            http_client,
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            Arc::new(SystemClock),
        )
    }

    /// Create a new JWKS client with custom cache TTL and clock.
    ///
    /// # Arguments
    ///
    /// * `jwks_uri` - Key-set URI from the issuer's discovery document
    /// * `http_client` - Shared HTTP client
    /// * `cache_ttl` - How long to cache JWKS before refreshing
    /// * `clock` - Time source for expiry
    pub fn with_ttl(
        jwks_uri: KeySetUri,
        http_client: reqwest::Client,
        cache_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jwks_uri,
            http_client,
            cache: RwLock::new(None),
            cache_ttl,
            clock,
        }
    }

    pub fn jwks_uri(&self) -> &KeySetUri {
        &self.jwks_uri
    }

    /// Get the verification key for a token.
    ///
    /// With a `kid`, the key carrying that ID is returned. Without one, the
    /// set must contain exactly one key.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailure::KeySetUnavailable` if JWKS cannot be fetched.
    /// Returns `ValidationFailure::KeyNotFound` if no key matches.
    #[instrument(skip_all, fields(kid = ?kid))]
    pub async fn get_key(&self, kid: Option<&str>) -> Result<Jwk, ValidationFailure> {
        // Check cache first
        {
            let now = self.clock.now();
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.expires_at > now) {
                if let Some(key) = select_key(&cached.keys, kid) {
                    tracing::debug!(target: "oidc.jwks", "JWKS cache hit");
                    return Ok(key.clone());
                }

                if now < cached.fetched_at + MIN_REFRESH_INTERVAL {
                    tracing::debug!(target: "oidc.jwks", "Key not found in recently fetched JWKS");
                    return Err(ValidationFailure::KeyNotFound);
                }
                tracing::debug!(target: "oidc.jwks", "Key not found in JWKS cache, refetching for rotation");
            }
        }

        // Cache miss, expired, or unknown kid - fetch fresh JWKS
        self.refresh_cache().await?;

        let cache = self.cache.read().await;
        if let Some(key) = cache.as_ref().and_then(|c| select_key(&c.keys, kid)) {
            return Ok(key.clone());
        }

        // Key not found even after refresh
        tracing::warn!(target: "oidc.jwks", uri = %self.jwks_uri, "Key not found in JWKS after refresh");
        Err(ValidationFailure::KeyNotFound)
    }

    /// Refresh the JWKS cache by fetching from the key-set URI.
    #[instrument(skip_all, fields(uri = %self.jwks_uri))]
    async fn refresh_cache(&self) -> Result<(), ValidationFailure> {
        let start = Instant::now();
        let result = self.fetch_jwks().await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_jwks_refresh(status, start.elapsed());

        let jwks = result?;

        tracing::info!(
            target: "oidc.jwks",
            key_count = jwks.keys.len(),
            "JWKS cache refreshed"
        );

        let now = self.clock.now();
        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys: jwks.keys,
            fetched_at: now,
            expires_at: expires_after(now, self.cache_ttl),
        });

        Ok(())
    }

    async fn fetch_jwks(&self) -> Result<JwkSet, ValidationFailure> {
        tracing::debug!(target: "oidc.jwks", "Fetching JWKS");

        let response = self
            .http_client
            .get(self.jwks_uri.as_str())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "oidc.jwks", error = %e, "Failed to fetch JWKS");
                ValidationFailure::KeySetUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "oidc.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(ValidationFailure::KeySetUnavailable(format!(
                "HTTP {}",
                response.status()
            )));
        }

        response.json::<JwkSet>().await.map_err(|e| {
            tracing::error!(target: "oidc.jwks", error = %e, "Failed to parse JWKS response");
            ValidationFailure::KeySetUnavailable(e.to_string())
        })
    }
}

/// Pick the key for `kid`, or the only key when no `kid` is given.
fn select_key<'a>(keys: &'a [Jwk], kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys
            .iter()
            .find(|key| key.common.key_id.as_deref() == Some(kid)),
        None if keys.len() == 1 => keys.first(),
        None => None,
    }
}

/// Shared map from key-set URI to its [`JwksClient`].
pub struct KeySetRegistry {
    clients: RwLock<HashMap<String, Arc<JwksClient>>>,
    http_client: reqwest::Client,
    cache_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl KeySetRegistry {
    pub fn new(http_client: reqwest::Client, cache_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            http_client,
            cache_ttl,
            clock,
        }
    }

    /// Get the client for `uri`, creating it on first use.
    ///
    /// Concurrent first requests for the same URI all receive the same client.
    pub async fn client_for(&self, uri: &KeySetUri) -> Arc<JwksClient> {
        if let Some(client) = self.clients.read().await.get(uri.as_str()) {
            return Arc::clone(client);
        }

        let mut clients = self.clients.write().await;
        let client = clients.entry(uri.as_str().to_string()).or_insert_with(|| {
            tracing::debug!(target: "oidc.jwks", uri = %uri, "Creating JWKS client");
            Arc::new(JwksClient::with_ttl(
                Arc::clone(uri),
                self.http_client.clone(),
                self.cache_ttl,
                Arc::clone(&self.clock),
            ))
        });
        Arc::clone(client)
    }

    /// Drop the client for `uri`, discarding its cached keys.
    pub async fn remove(&self, uri: &str) -> bool {
        self.clients.write().await.remove(uri).is_some()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }
}
