//! Integration tests for issuer key-set resolution.
//!
//! Each test runs a wiremock identity provider and resolves issuers through
//! a real `IssuerKeySetResolver` and `IssuerCache`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use oidc_matcher::clock::ManualClock;
use oidc_matcher::{DiscoveryError, IssuerCache, IssuerKeySetResolver};
use oidc_test_utils::{MockIdp, TestKeypair, TestTokenBuilder, DISCOVERY_PATH};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn resolver_with_ttl(ttl: Duration) -> IssuerKeySetResolver {
    IssuerKeySetResolver::new(reqwest::Client::new(), Arc::new(IssuerCache::new(ttl)))
}

fn resolver() -> IssuerKeySetResolver {
    resolver_with_ttl(Duration::from_secs(3600))
}

#[tokio::test]
async fn test_repeated_resolution_fetches_once() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_expecting(1).await;
    let resolver = resolver();

    let first = resolver.resolve_issuer(&idp.issuer()).await.unwrap();
    let second = resolver.resolve_issuer(&idp.issuer()).await.unwrap();

    assert_eq!(first.as_str(), idp.jwks_uri());
    assert_eq!(first, second);
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_resolve_from_token() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_expecting(1).await;
    let keypair = TestKeypair::new(1, "key-1");
    let token = keypair.sign(&TestTokenBuilder::new(&idp.issuer()).build());

    let uri = resolver().resolve(&token).await.unwrap();

    assert_eq!(uri.as_str(), idp.jwks_uri());
}

#[tokio::test]
async fn test_trailing_slash_variants_share_entry() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_expecting(1).await;
    let resolver = resolver();

    let plain = resolver.resolve_issuer(&idp.issuer()).await.unwrap();
    let slashed = resolver
        .resolve_issuer(&format!("{}/", idp.issuer()))
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&plain, &slashed));
    assert_eq!(resolver.cache().len().await, 1);
}

#[tokio::test]
async fn test_concurrent_first_resolutions_converge() {
    let idp = MockIdp::start().await;
    idp.mount_discovery().await;
    let resolver = Arc::new(resolver());

    let tasks = (0..10).map(|_| {
        let resolver = Arc::clone(&resolver);
        let issuer = idp.issuer();
        async move { resolver.resolve_issuer(&issuer).await }
    });
    let results = futures::future::join_all(tasks).await;

    assert_eq!(resolver.cache().len().await, 1);
    let cached = resolver.cache().get(&idp.issuer()).await.unwrap();
    assert_eq!(cached.as_str(), idp.jwks_uri());
    for result in results {
        assert_eq!(result.unwrap(), cached);
    }

    // However many fetches raced, later lookups are hits
    let fetches = idp.request_count(DISCOVERY_PATH).await;
    assert!((1..=10).contains(&fetches));
    resolver.resolve_issuer(&idp.issuer()).await.unwrap();
    assert_eq!(idp.request_count(DISCOVERY_PATH).await, fetches);
}

#[tokio::test]
async fn test_missing_jwks_uri_is_malformed_document() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_document(json!({"issuer": idp.issuer()}), Some(1))
        .await;

    let err = resolver().resolve_issuer(&idp.issuer()).await.unwrap_err();

    assert!(matches!(err, DiscoveryError::MalformedDocument(_)));
}

#[tokio::test]
async fn test_non_json_body_is_malformed_document() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_raw(200, "<html>not json</html>").await;

    let err = resolver().resolve_issuer(&idp.issuer()).await.unwrap_err();

    assert!(matches!(err, DiscoveryError::MalformedDocument(_)));
}

#[tokio::test]
async fn test_http_error_is_fetch_failed() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_raw(404, "not found").await;

    let err = resolver().resolve_issuer(&idp.issuer()).await.unwrap_err();

    assert!(matches!(err, DiscoveryError::FetchFailed(msg) if msg.contains("404")));
}

#[tokio::test]
async fn test_unreachable_issuer_is_fetch_failed() {
    let idp = MockIdp::start().await;
    let issuer = idp.issuer();
    drop(idp);

    let err = resolver().resolve_issuer(&issuer).await.unwrap_err();

    assert!(matches!(err, DiscoveryError::FetchFailed(_)));
}

#[tokio::test]
async fn test_invalid_jwks_uri() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_document(json!({"jwks_uri": "::not a uri::"}), None)
        .await;

    let err = resolver().resolve_issuer(&idp.issuer()).await.unwrap_err();

    assert!(matches!(err, DiscoveryError::InvalidUri(_)));
}

#[tokio::test]
async fn test_failures_are_not_cached() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_raw(500, "boom").await;
    let resolver = resolver();

    assert!(resolver.resolve_issuer(&idp.issuer()).await.is_err());
    assert!(resolver.cache().is_empty().await);

    idp.reset().await;
    idp.mount_discovery().await;

    let uri = resolver.resolve_issuer(&idp.issuer()).await.unwrap();
    assert_eq!(uri.as_str(), idp.jwks_uri());
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_expecting(2).await;
    let clock = Arc::new(ManualClock::new());
    let cache = Arc::new(IssuerCache::with_clock(
        Duration::from_secs(60),
        clock.clone(),
    ));
    let resolver = IssuerKeySetResolver::new(reqwest::Client::new(), cache);

    resolver.resolve_issuer(&idp.issuer()).await.unwrap();
    clock.advance(Duration::from_secs(30));
    resolver.resolve_issuer(&idp.issuer()).await.unwrap();
    clock.advance(Duration::from_secs(31));
    resolver.resolve_issuer(&idp.issuer()).await.unwrap();
}

#[tokio::test]
async fn test_invalidation_forces_refetch() {
    let idp = MockIdp::start().await;
    idp.mount_discovery_expecting(2).await;
    let resolver = resolver();

    resolver.resolve_issuer(&idp.issuer()).await.unwrap();
    assert!(resolver.cache().invalidate(&idp.issuer()).await);
    resolver.resolve_issuer(&idp.issuer()).await.unwrap();
}
