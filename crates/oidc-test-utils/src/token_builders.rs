//! Builder patterns for test data construction
//!
//! Provides a fluent API for identity-provider token claims. Every
//! registered claim can be overridden or omitted.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for creating test JWT claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new("https://idp.test")
///     .for_user("alice")
///     .with_audience("app1")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    iss: Option<String>,
    sub: Option<String>,
    aud: Option<Value>,
    exp: Option<i64>,
    iat: Option<i64>,
    nbf: Option<i64>,
    extra: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a builder with a valid claim set for `issuer`.
    ///
    /// Defaults: subject `test-subject`, audience `test-audience`, issued
    /// now, expiring in one hour.
    pub fn new(issuer: &str) -> Self {
        let now = Utc::now();
        Self {
            iss: Some(issuer.to_string()),
            sub: Some("test-subject".to_string()),
            aud: Some(json!("test-audience")),
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            iat: Some(now.timestamp()),
            nbf: None,
            extra: Map::new(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Set a single audience
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.aud = Some(json!(audience));
        self
    }

    /// Set an audience array
    pub fn with_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Some(json!(audiences));
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = Some(timestamp);
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Add a private claim (e.g. `groups`)
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    pub fn without_issuer(mut self) -> Self {
        self.iss = None;
        self
    }

    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    pub fn without_audience(mut self) -> Self {
        self.aud = None;
        self
    }

    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    pub fn without_issued_at(mut self) -> Self {
        self.iat = None;
        self
    }

    /// Build the claims as a JSON value, leaving out omitted claims
    pub fn build(self) -> Value {
        let mut claims = self.extra;
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), json!(iss));
        }
        if let Some(sub) = self.sub {
            claims.insert("sub".to_string(), json!(sub));
        }
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), aud);
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), json!(exp));
        }
        if let Some(iat) = self.iat {
            claims.insert("iat".to_string(), json!(iat));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), json!(nbf));
        }
        Value::Object(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creates_valid_claims() {
        let claims = TestTokenBuilder::new("https://idp.test")
            .for_user("alice")
            .with_audience("app1")
            .build();

        assert_eq!(claims["iss"], "https://idp.test");
        assert_eq!(claims["sub"], "alice");
        assert_eq!(claims["aud"], "app1");
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
    }

    #[test]
    fn test_builder_omits_claims() {
        let claims = TestTokenBuilder::new("https://idp.test")
            .without_subject()
            .without_issued_at()
            .build();

        assert!(claims.get("sub").is_none());
        assert!(claims.get("iat").is_none());
        assert!(claims.get("exp").is_some());
    }

    #[test]
    fn test_builder_audience_array() {
        let claims = TestTokenBuilder::new("https://idp.test")
            .with_audiences(&["a", "b"])
            .build();
        assert_eq!(claims["aud"], json!(["a", "b"]));
    }

    #[test]
    fn test_builder_private_claims() {
        let claims = TestTokenBuilder::new("https://idp.test")
            .with_claim("groups", json!(["admins", "ops"]))
            .build();

        assert_eq!(claims["groups"], json!(["admins", "ops"]));
        assert_eq!(claims["iss"], "https://idp.test");
    }
}
