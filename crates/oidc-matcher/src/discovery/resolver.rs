//! Issuer key-set resolver.
//!
//! Maps a token to the JWK Set URI its issuer publishes in
//! `{issuer}/.well-known/openid-configuration`.
//!
//! # Security
//!
//! - The issuer is read from the token WITHOUT verifying the signature. It is
//!   used to find keys, never to grant anything.
//! - Only `jwks_uri` is read from the discovery document.

use crate::discovery::cache::{IssuerCache, KeySetUri};
use crate::errors::DiscoveryError;
use crate::observability::metrics;
use common::jwt::{extract_issuer, normalize_issuer};
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Well-known path of the OpenID Connect discovery document.
pub const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";

/// Discovery document field naming the JWK Set location.
pub const JWKS_URI_FIELD: &str = "jwks_uri";

/// Resolves issuers to key-set URIs through a shared [`IssuerCache`].
pub struct IssuerKeySetResolver {
    http_client: reqwest::Client,
    cache: Arc<IssuerCache>,
}

impl IssuerKeySetResolver {
    /// Create a resolver.
    ///
    /// # Arguments
    ///
    /// * `http_client` - Client used for discovery fetches (carries the timeout)
    /// * `cache` - Cache shared by every resolver in the process
    pub fn new(http_client: reqwest::Client, cache: Arc<IssuerCache>) -> Self {
        Self { http_client, cache }
    }

    pub fn cache(&self) -> &Arc<IssuerCache> {
        &self.cache
    }

    /// Resolve the key-set URI for the issuer named in `token`.
    ///
    /// # Errors
    ///
    /// - `MalformedToken` - token is not a structurally valid JWT
    /// - `TokenTooLarge` - token exceeds the hard size ceiling
    /// - `MissingIssuer` - no usable `iss` claim
    /// - see [`Self::resolve_issuer`] for fetch failures
    #[instrument(skip_all)]
    pub async fn resolve(&self, token: &str) -> Result<KeySetUri, DiscoveryError> {
        let issuer = extract_issuer(token).map_err(DiscoveryError::from)?;

        self.resolve_issuer(&issuer).await
    }

    /// Resolve the key-set URI for an issuer identifier.
    ///
    /// A trailing `/` on `issuer` is ignored. A cache hit performs no I/O.
    ///
    /// # Errors
    ///
    /// - `MissingIssuer` - `issuer` is empty after normalization
    /// - `FetchFailed` - transport error or non-success status
    /// - `MalformedDocument` - body is not a JSON object or lacks `jwks_uri`
    /// - `InvalidUri` - `jwks_uri` does not parse as a URL
    #[instrument(skip_all, fields(issuer = %issuer))]
    pub async fn resolve_issuer(&self, issuer: &str) -> Result<KeySetUri, DiscoveryError> {
        let issuer = normalize_issuer(issuer);
        if issuer.is_empty() {
            return Err(DiscoveryError::MissingIssuer);
        }

        if let Some(uri) = self.cache.get(issuer).await {
            tracing::debug!(target: "oidc.discovery", "Key set URI cache hit");
            metrics::record_discovery_cache("hit");
            return Ok(uri);
        }
        metrics::record_discovery_cache("miss");

        // Fetch outside any lock; the cache re-checks on insert
        let start = Instant::now();
        let fetched = self.fetch_jwks_uri(issuer).await;
        let status = if fetched.is_ok() { "success" } else { "error" };
        metrics::record_discovery_fetch(status, start.elapsed());

        let uri = fetched?;
        Ok(self.cache.get_or_insert(issuer, uri).await)
    }

    /// Fetch the discovery document and extract `jwks_uri`.
    async fn fetch_jwks_uri(&self, issuer: &str) -> Result<Url, DiscoveryError> {
        let discovery_url = format!("{issuer}{OPENID_CONFIGURATION_PATH}");
        tracing::debug!(target: "oidc.discovery", url = %discovery_url, "Fetching discovery document");

        let response = self
            .http_client
            .get(&discovery_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(target: "oidc.discovery", error = %e, "Failed to fetch discovery document");
                DiscoveryError::FetchFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                target: "oidc.discovery",
                status = %response.status(),
                "Discovery endpoint returned error"
            );
            return Err(DiscoveryError::FetchFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            tracing::warn!(target: "oidc.discovery", error = %e, "Failed to read discovery document");
            DiscoveryError::FetchFailed(e.to_string())
        })?;

        let document: Value = serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(target: "oidc.discovery", error = %e, "Discovery document is not JSON");
            DiscoveryError::MalformedDocument(format!("invalid JSON: {e}"))
        })?;

        parse_jwks_uri(&document)
    }
}

/// Pull `jwks_uri` out of a parsed discovery document.
///
/// The value is rendered to text, trimmed, and stripped of `"` characters
/// before URL parsing, so a quoted or whitespace-padded value still resolves.
fn parse_jwks_uri(document: &Value) -> Result<Url, DiscoveryError> {
    let Value::Object(fields) = document else {
        return Err(DiscoveryError::MalformedDocument(
            "document is not a JSON object".to_string(),
        ));
    };

    let raw = match fields.get(JWKS_URI_FIELD) {
        None | Some(Value::Null) => {
            tracing::warn!(target: "oidc.discovery", "Discovery document has no jwks_uri");
            return Err(DiscoveryError::MalformedDocument(format!(
                "missing '{JWKS_URI_FIELD}' property"
            )));
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    let cleaned = raw.trim().replace('"', "");
    Url::parse(&cleaned).map_err(|e| {
        tracing::warn!(target: "oidc.discovery", value = %cleaned, error = %e, "jwks_uri is not a valid URI");
        DiscoveryError::InvalidUri(format!("'{cleaned}': {e}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_parse_jwks_uri_plain_string() {
        let doc = json!({"issuer": "https://idp.test", "jwks_uri": "https://idp.test/keys"});
        assert_eq!(
            parse_jwks_uri(&doc).unwrap().as_str(),
            "https://idp.test/keys"
        );
    }

    #[test]
    fn test_parse_jwks_uri_strips_quoting_artifacts() {
        let doc = json!({"jwks_uri": "  \"https://idp.test/keys\" "});
        assert_eq!(
            parse_jwks_uri(&doc).unwrap().as_str(),
            "https://idp.test/keys"
        );
    }

    #[test]
    fn test_parse_jwks_uri_missing_field() {
        let doc = json!({"issuer": "https://idp.test"});
        assert!(matches!(
            parse_jwks_uri(&doc),
            Err(DiscoveryError::MalformedDocument(msg)) if msg.contains("jwks_uri")
        ));
    }

    #[test]
    fn test_parse_jwks_uri_null_field() {
        let doc = json!({"jwks_uri": null});
        assert!(matches!(
            parse_jwks_uri(&doc),
            Err(DiscoveryError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_parse_jwks_uri_not_an_object() {
        let doc = json!(["https://idp.test/keys"]);
        assert!(matches!(
            parse_jwks_uri(&doc),
            Err(DiscoveryError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_parse_jwks_uri_invalid_uri() {
        let doc = json!({"jwks_uri": "not a uri"});
        assert!(matches!(
            parse_jwks_uri(&doc),
            Err(DiscoveryError::InvalidUri(_))
        ));

        let doc = json!({"jwks_uri": 42});
        assert!(matches!(
            parse_jwks_uri(&doc),
            Err(DiscoveryError::InvalidUri(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_rejects_token_without_issuer() {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

        let resolver = IssuerKeySetResolver::new(
            reqwest::Client::new(),
            Arc::new(IssuerCache::new(Duration::from_secs(60))),
        );
        let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"alice"}"#);
        let token = format!("e30.{payload}.sig");

        assert_eq!(
            resolver.resolve(&token).await,
            Err(DiscoveryError::MissingIssuer)
        );
        assert_eq!(
            resolver.resolve("garbage").await,
            Err(DiscoveryError::MalformedToken)
        );
    }

    #[tokio::test]
    async fn test_resolve_issuer_cache_hit_skips_network() {
        let cache = Arc::new(IssuerCache::new(Duration::from_secs(60)));
        cache
            .get_or_insert(
                "https://unreachable.invalid",
                Url::parse("https://unreachable.invalid/keys").unwrap(),
            )
            .await;
        let resolver = IssuerKeySetResolver::new(reqwest::Client::new(), cache);

        // Trailing slash normalizes to the cached key
        let uri = resolver
            .resolve_issuer("https://unreachable.invalid/")
            .await
            .unwrap();
        assert_eq!(uri.as_str(), "https://unreachable.invalid/keys");
    }
}
