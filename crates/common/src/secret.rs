//! Secret types for credentials that must never reach a log line.
//!
//! Re-exports the [`secrecy`] types and defines [`CredentialKey`], the stored
//! credential a presented token is compared against.
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` that holds one is safe to pass to `tracing`. The inner value is only
//! reachable through [`ExposeSecret::expose_secret`] and is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::CredentialKey;
//!
//! let stored = CredentialKey::from("eyJhbGciOi...");
//! assert!(stored.matches("eyJhbGciOi..."));
//! assert!(!format!("{stored:?}").contains("eyJ"));
//! ```

use std::fmt;

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// A stored credential as handed over by the authentication framework.
///
/// For JWT credentials the key is the compact token string itself.
#[derive(Clone)]
pub struct CredentialKey(SecretString);

impl CredentialKey {
    /// Wrap an already-secret value.
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self(key)
    }

    /// Exact string comparison against a presented credential.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        self.0.expose_secret() == presented
    }

    /// Access the raw key.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl From<&str> for CredentialKey {
    fn from(key: &str) -> Self {
        Self(SecretString::from(key))
    }
}

impl From<String> for CredentialKey {
    fn from(key: String) -> Self {
        Self(SecretString::from(key))
    }
}

impl fmt::Debug for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialKey").field(&"[REDACTED]").finish()
    }
}
