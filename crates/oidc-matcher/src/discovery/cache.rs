//! Issuer → key-set URI cache.
//!
//! Entries live for a fixed TTL and can be dropped early with
//! [`IssuerCache::invalidate`]. The cache owns its lock; callers never see it.
//!
//! # Concurrency
//!
//! Readers share a read lock. [`IssuerCache::get_or_insert`] takes the write
//! lock and re-checks before inserting, so when several tasks race to resolve
//! the same issuer the first insert wins and every caller gets that value.
//! Network I/O is never performed while the lock is held.
//!
//! # Retired URIs
//!
//! When an entry is replaced with a different URI, invalidated, or cleared,
//! its URI is remembered until [`IssuerCache::take_retired`] collects it, so
//! per-URI state held elsewhere can be released.

use crate::clock::{expires_after, Clock, SystemClock};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Resolved location of an issuer's JWK Set. Cloning is a refcount bump.
pub type KeySetUri = Arc<Url>;

struct CacheEntry {
    uri: KeySetUri,
    expires_at: Instant,
}

/// TTL cache from normalized issuer identifier to [`KeySetUri`].
pub struct IssuerCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    retired: Mutex<Vec<KeySetUri>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl IssuerCache {
    /// Create a cache whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
            ttl,
            clock,
        }
    }

    /// Look up a fresh entry for `issuer`.
    pub async fn get(&self, issuer: &str) -> Option<KeySetUri> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(issuer)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| Arc::clone(&entry.uri))
    }

    /// Insert `uri` for `issuer` unless a fresh entry already exists.
    ///
    /// Returns the entry that is in the cache afterwards: either the one just
    /// inserted or the one a concurrent caller inserted first.
    pub async fn get_or_insert(&self, issuer: &str, uri: Url) -> KeySetUri {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        // Re-check: another task may have inserted while our fetch was in flight
        if let Some(existing) = entries.get(issuer).filter(|e| e.expires_at > now) {
            if *existing.uri != uri {
                tracing::warn!(
                    target: "oidc.discovery.cache",
                    issuer = %issuer,
                    cached = %existing.uri,
                    fetched = %uri,
                    "Concurrent discovery returned a different key set URI, keeping cached value"
                );
            }
            return Arc::clone(&existing.uri);
        }

        let uri = Arc::new(uri);
        let replaced = entries.insert(
            issuer.to_string(),
            CacheEntry {
                uri: Arc::clone(&uri),
                expires_at: expires_after(now, self.ttl),
            },
        );
        if let Some(old) = replaced.filter(|old| old.uri != uri) {
            tracing::info!(
                target: "oidc.discovery.cache",
                issuer = %issuer,
                old = %old.uri,
                new = %uri,
                "Key set URI changed"
            );
            self.retired.lock().await.push(old.uri);
        }
        tracing::debug!(target: "oidc.discovery.cache", issuer = %issuer, uri = %uri, "Cached key set URI");
        uri
    }

    /// Drop the entry for `issuer`. Returns whether one was present.
    pub async fn invalidate(&self, issuer: &str) -> bool {
        let mut entries = self.entries.write().await;
        let Some(removed) = entries.remove(issuer) else {
            return false;
        };
        tracing::info!(target: "oidc.discovery.cache", issuer = %issuer, "Key set URI invalidated");
        self.retired.lock().await.push(removed.uri);
        true
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        self.retired
            .lock()
            .await
            .extend(entries.drain().map(|(_, entry)| entry.uri));
    }

    /// Take the URIs dropped since the last call that no entry still maps to.
    pub async fn take_retired(&self) -> Vec<KeySetUri> {
        let entries = self.entries.read().await;
        let mut retired = self.retired.lock().await;
        retired
            .drain(..)
            .filter(|uri| !entries.values().any(|entry| entry.uri == *uri))
            .collect()
    }

    /// Number of stored entries, including expired ones not yet replaced.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_get_on_empty_cache() {
        let cache = IssuerCache::new(Duration::from_secs(60));
        assert!(cache.get("https://idp.test").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let cache = IssuerCache::new(Duration::from_secs(60));
        let inserted = cache
            .get_or_insert("https://idp.test", url("https://idp.test/keys"))
            .await;

        let cached = cache.get("https://idp.test").await.unwrap();
        assert_eq!(cached.as_str(), "https://idp.test/keys");
        assert!(Arc::ptr_eq(&inserted, &cached));
    }

    #[tokio::test]
    async fn test_first_insert_wins() {
        let cache = IssuerCache::new(Duration::from_secs(60));
        cache
            .get_or_insert("https://idp.test", url("https://idp.test/keys"))
            .await;

        let second = cache
            .get_or_insert("https://idp.test", url("https://idp.test/other-keys"))
            .await;

        assert_eq!(second.as_str(), "https://idp.test/keys");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let clock = Arc::new(ManualClock::new());
        let cache = IssuerCache::with_clock(Duration::from_secs(60), clock.clone());
        cache
            .get_or_insert("https://idp.test", url("https://idp.test/keys"))
            .await;

        clock.advance(Duration::from_secs(59));
        assert!(cache.get("https://idp.test").await.is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("https://idp.test").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_replaced() {
        let clock = Arc::new(ManualClock::new());
        let cache = IssuerCache::with_clock(Duration::from_secs(60), clock.clone());
        cache
            .get_or_insert("https://idp.test", url("https://idp.test/old"))
            .await;

        clock.advance(Duration::from_secs(61));
        let replaced = cache
            .get_or_insert("https://idp.test", url("https://idp.test/new"))
            .await;

        assert_eq!(replaced.as_str(), "https://idp.test/new");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = IssuerCache::new(Duration::from_secs(60));
        cache
            .get_or_insert("https://a.test", url("https://a.test/keys"))
            .await;
        cache
            .get_or_insert("https://b.test", url("https://b.test/keys"))
            .await;

        assert!(cache.invalidate("https://a.test").await);
        assert!(!cache.invalidate("https://a.test").await);
        assert!(cache.get("https://a.test").await.is_none());
        assert!(cache.get("https://b.test").await.is_some());

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_huge_ttl_does_not_overflow() {
        let cache = IssuerCache::new(Duration::MAX);
        cache
            .get_or_insert("https://idp.test", url("https://idp.test/keys"))
            .await;

        assert!(cache.get("https://idp.test").await.is_some());
    }

    #[tokio::test]
    async fn test_replaced_uri_is_retired() {
        let clock = Arc::new(ManualClock::new());
        let cache = IssuerCache::with_clock(Duration::from_secs(60), clock.clone());
        cache
            .get_or_insert("https://idp.test", url("https://idp.test/old"))
            .await;
        assert!(cache.take_retired().await.is_empty());

        // Same URI on refresh retires nothing
        clock.advance(Duration::from_secs(61));
        cache
            .get_or_insert("https://idp.test", url("https://idp.test/old"))
            .await;
        assert!(cache.take_retired().await.is_empty());

        clock.advance(Duration::from_secs(61));
        cache
            .get_or_insert("https://idp.test", url("https://idp.test/new"))
            .await;

        let retired = cache.take_retired().await;
        assert_eq!(retired.len(), 1);
        assert_eq!(retired.first().map(|uri| uri.as_str()), Some("https://idp.test/old"));
        assert!(cache.take_retired().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidated_and_cleared_uris_are_retired() {
        let cache = IssuerCache::new(Duration::from_secs(60));
        cache
            .get_or_insert("https://a.test", url("https://a.test/keys"))
            .await;
        cache
            .get_or_insert("https://b.test", url("https://b.test/keys"))
            .await;

        cache.invalidate("https://a.test").await;
        let retired = cache.take_retired().await;
        assert_eq!(retired.len(), 1);
        assert_eq!(retired.first().map(|uri| uri.as_str()), Some("https://a.test/keys"));

        cache.clear().await;
        let retired = cache.take_retired().await;
        assert_eq!(retired.len(), 1);
        assert_eq!(retired.first().map(|uri| uri.as_str()), Some("https://b.test/keys"));
    }

    #[tokio::test]
    async fn test_uri_shared_by_live_entry_is_not_retired() {
        let cache = IssuerCache::new(Duration::from_secs(60));
        cache
            .get_or_insert("https://a.test", url("https://shared.test/keys"))
            .await;
        cache
            .get_or_insert("https://b.test", url("https://shared.test/keys"))
            .await;

        cache.invalidate("https://a.test").await;

        assert!(cache.take_retired().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_inserts_converge() {
        let cache = Arc::new(IssuerCache::new(Duration::from_secs(60)));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    cache
                        .get_or_insert("https://idp.test", url(&format!("https://idp.test/keys/{i}")))
                        .await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        let winner = cache.get("https://idp.test").await.unwrap();
        assert_eq!(cache.len().await, 1);
        assert!(results.iter().all(|uri| **uri == *winner));
    }
}
