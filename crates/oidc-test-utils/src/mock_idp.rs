//! Mock OpenID Connect identity provider.
//!
//! Wraps a `wiremock` server that can serve a discovery document and a JWK
//! Set. Mount helpers take an optional expected call count, verified when
//! the server drops.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path of the discovery document.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// Path the mock publishes its JWK Set at.
pub const JWKS_PATH: &str = "/jwks";

/// Identity provider backed by a local mock HTTP server.
pub struct MockIdp {
    server: MockServer,
}

impl MockIdp {
    /// Start a fresh mock server with nothing mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Issuer identifier (the server's base URL, no trailing slash).
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Standard discovery document pointing at [`Self::jwks_uri`].
    pub fn discovery_document(&self) -> Value {
        json!({
            "issuer": self.issuer(),
            "jwks_uri": self.jwks_uri(),
            "id_token_signing_alg_values_supported": ["EdDSA"],
        })
    }

    /// Serve the standard discovery document.
    pub async fn mount_discovery(&self) {
        self.mount_discovery_document(self.discovery_document(), None)
            .await;
    }

    /// Serve the standard discovery document, expecting exactly `times` fetches.
    pub async fn mount_discovery_expecting(&self, times: u64) {
        self.mount_discovery_document(self.discovery_document(), Some(times))
            .await;
    }

    /// Serve `document` as the discovery document.
    pub async fn mount_discovery_document(&self, document: Value, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document));
        mount(mock, times, &self.server).await;
    }

    /// Serve a raw discovery response body with `status`.
    pub async fn mount_discovery_raw(&self, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a JWK Set containing `keys`.
    pub async fn mount_jwks(&self, keys: &[&TestKeypair]) {
        self.mount_jwks_expecting(keys, None).await;
    }

    /// Serve a JWK Set containing `keys`, optionally expecting `times` fetches.
    pub async fn mount_jwks_expecting(&self, keys: &[&TestKeypair], times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)));
        mount(mock, times, &self.server).await;
    }

    /// Serve a JWK Set containing `keys` at `jwks_path` on the same server.
    pub async fn mount_jwks_at(&self, jwks_path: &str, keys: &[&TestKeypair]) {
        Mock::given(method("GET"))
            .and(path(jwks_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .mount(&self.server)
            .await;
    }

    /// Remove every mounted response.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of requests received for `request_path`.
    pub async fn request_count(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}

async fn mount(mock: Mock, times: Option<u64>, server: &MockServer) {
    match times {
        Some(n) => mock.expect(n).mount(server).await,
        None => mock.mount(server).await,
    }
}
