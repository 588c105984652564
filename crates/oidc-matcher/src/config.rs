//! Matcher configuration.
//!
//! Configuration is loaded from environment variables. Allowed audiences and
//! issuers are comma-separated lists; everything else has a default.

use common::jwt::{
    normalize_issuer, DEFAULT_CLOCK_SKEW, DEFAULT_JWT_SIZE_BYTES, MAX_CLOCK_SKEW,
    MAX_JWT_SIZE_BYTES,
};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default issuer → key-set URI cache TTL in seconds (1 hour).
pub const DEFAULT_DISCOVERY_CACHE_TTL_SECONDS: u64 = 3600;

/// Default signing-key cache TTL in seconds (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default timeout for discovery and JWKS requests.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// Upper bound for either cache TTL (7 days).
pub const MAX_CACHE_TTL_SECONDS: u64 = 7 * 24 * 3600;

/// Upper bound for the outbound request timeout (5 minutes).
pub const MAX_HTTP_TIMEOUT_SECONDS: u64 = 300;

/// Audiences and issuers a token must match.
///
/// Supplied per match call; the matcher never caches it, so a reloaded
/// configuration takes effect on the next attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Token `aud` must intersect this list.
    pub allowed_audiences: Vec<String>,

    /// Token `iss` must equal one of these (trailing slash ignored).
    pub allowed_issuers: Vec<String>,
}

impl ValidationPolicy {
    pub fn new(allowed_audiences: Vec<String>, allowed_issuers: Vec<String>) -> Self {
        Self {
            allowed_audiences,
            allowed_issuers,
        }
    }

    /// Reject policies that could never match or that hide a typo.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidPolicy` if either list is empty or holds a
    /// blank entry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_audiences.is_empty() {
            return Err(ConfigError::InvalidPolicy(
                "allowed audiences must not be empty".to_string(),
            ));
        }
        if self.allowed_issuers.is_empty() {
            return Err(ConfigError::InvalidPolicy(
                "allowed issuers must not be empty".to_string(),
            ));
        }
        if self.allowed_audiences.iter().any(|a| a.trim().is_empty()) {
            return Err(ConfigError::InvalidPolicy(
                "allowed audiences must not contain blank entries".to_string(),
            ));
        }
        if self
            .allowed_issuers
            .iter()
            .any(|i| normalize_issuer(i.trim()).is_empty())
        {
            return Err(ConfigError::InvalidPolicy(
                "allowed issuers must not contain blank entries".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `issuer` is allowed, comparing normalized forms.
    pub fn allows_issuer(&self, issuer: &str) -> bool {
        let issuer = normalize_issuer(issuer);
        self.allowed_issuers
            .iter()
            .any(|allowed| normalize_issuer(allowed) == issuer)
    }
}

/// Matcher configuration.
#[derive(Clone)]
pub struct Config {
    /// Allowed token audiences.
    pub allowed_audiences: Vec<String>,

    /// Allowed token issuers.
    pub allowed_issuers: Vec<String>,

    /// Lifetime of an issuer → key-set URI cache entry.
    pub discovery_cache_ttl_seconds: u64,

    /// Lifetime of a fetched key set before it is refetched.
    pub jwks_cache_ttl_seconds: u64,

    /// Timeout applied to every outbound HTTP request.
    pub http_timeout_seconds: u64,

    /// JWT clock skew tolerance in seconds.
    pub jwt_clock_skew_seconds: u64,

    /// Largest presented token, in bytes, that is decoded at all.
    pub jwt_max_size_bytes: usize,
}

/// Allow-lists are printed comma-joined, matching the environment format.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("allowed_audiences", &self.allowed_audiences.join(","))
            .field("allowed_issuers", &self.allowed_issuers.join(","))
            .field(
                "discovery_cache_ttl_seconds",
                &self.discovery_cache_ttl_seconds,
            )
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .field("http_timeout_seconds", &self.http_timeout_seconds)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("jwt_max_size_bytes", &self.jwt_max_size_bytes)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid validation policy: {0}")]
    InvalidPolicy(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid token size limit: {0}")]
    InvalidSizeLimit(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let allowed_audiences = parse_list(vars, "JWT_ALLOWED_AUDIENCES")?;
        let allowed_issuers = parse_list(vars, "JWT_ALLOWED_ISSUERS")?;

        let discovery_cache_ttl_seconds = parse_bounded(
            vars,
            "DISCOVERY_CACHE_TTL_SECONDS",
            DEFAULT_DISCOVERY_CACHE_TTL_SECONDS,
            MAX_CACHE_TTL_SECONDS,
            ConfigError::InvalidDuration,
        )?;

        let jwks_cache_ttl_seconds = parse_bounded(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
            MAX_CACHE_TTL_SECONDS,
            ConfigError::InvalidDuration,
        )?;

        let http_timeout_seconds = parse_bounded(
            vars,
            "HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
            MAX_HTTP_TIMEOUT_SECONDS,
            ConfigError::InvalidDuration,
        )?;

        let jwt_max_size_bytes = parse_bounded(
            vars,
            "JWT_MAX_SIZE_BYTES",
            DEFAULT_JWT_SIZE_BYTES as u64,
            MAX_JWT_SIZE_BYTES as u64,
            ConfigError::InvalidSizeLimit,
        )?;
        let jwt_max_size_bytes = usize::try_from(jwt_max_size_bytes)
            .map_err(|e| ConfigError::InvalidSizeLimit(format!("JWT_MAX_SIZE_BYTES: {e}")))?;

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            let value = value.unsigned_abs();
            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs()
        };

        let config = Config {
            allowed_audiences,
            allowed_issuers,
            discovery_cache_ttl_seconds,
            jwks_cache_ttl_seconds,
            http_timeout_seconds,
            jwt_clock_skew_seconds,
            jwt_max_size_bytes,
        };
        config.policy().validate()?;

        Ok(config)
    }

    /// Snapshot the allow-lists as a policy for one match attempt.
    pub fn policy(&self) -> ValidationPolicy {
        ValidationPolicy::new(self.allowed_audiences.clone(), self.allowed_issuers.clone())
    }

    pub fn discovery_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery_cache_ttl_seconds)
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl_seconds)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.jwt_clock_skew_seconds)
    }
}

/// Split a comma-separated variable, trimming entries and dropping empty ones.
fn parse_list(vars: &HashMap<String, String>, name: &str) -> Result<Vec<String>, ConfigError> {
    let raw = vars
        .get(name)
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))?;

    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(ToString::to_string)
        .collect())
}

/// Parse an optional positive integer no larger than `max`.
fn parse_bounded(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    max: u64,
    invalid: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        invalid(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(invalid(format!(
            "{} must be greater than 0",
            name
        )));
    }

    if value > max {
        return Err(invalid(format!(
            "{} must not exceed {}, got {}",
            name, max, value
        )));
    }

    Ok(value)
}
