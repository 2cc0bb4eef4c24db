mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use auth_gateway::identity::{
    ClaimMapper, IdentityResolver, JwksCache, LocalVerifier, TokenVerifier, UserinfoVerifier,
    VerificationCache,
};
use auth_gateway::session::MemorySessionStore;
use auth_gateway::settings::ClaimSettings;
use bytes::Bytes;
use common::*;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde_json::{json, Value};

/// 호출 횟수를 세는 JWKS 엔드포인트
async fn spawn_jwks(keys: Value) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = spawn_server(move |_req: Request<Incoming>| {
        let counter = counter.clone();
        let keys = keys.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            json_response(&keys)
        }
    })
    .await;
    (format!("http://{}/protocol/openid-connect/certs", addr), hits)
}

fn claims(exp_offset: i64) -> Value {
    json!({
        "sub": "1234",
        "preferred_username": "alice",
        "email": "alice@example.org",
        "given_name": "Alice",
        "family_name": "Liddell",
        "exp": (now() as i64 + exp_offset),
        "resource_access": { "anduin": { "roles": ["admin", "offline_access"] } },
        "roles": ["viewer"],
    })
}

fn local(jwks_uri: &str) -> LocalVerifier {
    LocalVerifier::new(Arc::new(JwksCache::new(Duration::from_secs(3600))), jwks_uri)
}

#[tokio::test]
async fn test_rs256_token_verified_with_served_jwks() {
    let (jwks_uri, hits) = spawn_jwks(jwks()).await;
    let verifier = local(&jwks_uri);

    let token = sign(&claims(300), Some(KID));
    let verification = verifier.verify(&token).await.unwrap();
    assert!(verification.active, "{:?}", verification.error);
    assert_eq!(verification.claims.unwrap()["preferred_username"], "alice");

    // 키 세트는 캐시됨
    assert!(verifier.verify(&token).await.unwrap().active);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_token_is_inactive() {
    let (jwks_uri, _) = spawn_jwks(jwks()).await;
    let token = sign(&claims(-3600), Some(KID));
    let verification = local(&jwks_uri).verify(&token).await.unwrap();
    assert!(!verification.active);
    assert!(verification.error.is_some());
}

#[tokio::test]
async fn test_unknown_kid_refreshes_key_set_once() {
    let (jwks_uri, hits) = spawn_jwks(jwks()).await;
    let verifier = local(&jwks_uri);

    let token = sign(&claims(300), Some("rotated-key"));
    let verification = verifier.verify(&token).await.unwrap();
    assert!(!verification.active);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_kids_do_not_refetch_within_cooldown() {
    let (jwks_uri, hits) = spawn_jwks(jwks()).await;
    let verifier = local(&jwks_uri);

    for i in 0..50 {
        let kid = format!("unknown-{}", i);
        let token = sign(&claims(300), Some(kid.as_str()));
        assert!(!verifier.verify(&token).await.unwrap().active);
    }
    // 최초 조회 한 번과 강제 재조회 한 번
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    let token = sign(&claims(300), Some(KID));
    assert!(verifier.verify(&token).await.unwrap().active);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_forced_refresh_allowed_again_after_cooldown() {
    let (jwks_uri, hits) = spawn_jwks(jwks()).await;
    let cache = JwksCache::new(Duration::from_secs(3600)).with_refresh_cooldown(Duration::from_millis(100));
    let verifier = LocalVerifier::new(Arc::new(cache), &jwks_uri);

    let token = sign(&claims(300), Some("rotated-key"));
    assert!(!verifier.verify(&token).await.unwrap().active);
    assert!(!verifier.verify(&token).await.unwrap().active);
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!verifier.verify(&token).await.unwrap().active);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_token_without_kid_is_inactive() {
    let (jwks_uri, hits) = spawn_jwks(jwks()).await;
    let token = sign(&claims(300), None);
    assert!(!local(&jwks_uri).verify(&token).await.unwrap().active);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_key_set_is_an_error() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let token = sign(&claims(300), Some(KID));
    let result = local(&format!("http://{}/certs", closed)).verify(&token).await;
    assert!(result.is_err());
}

/// `delay` 동안 기다린 뒤 `status`로 응답하는 userinfo 엔드포인트
async fn spawn_userinfo(status: StatusCode, delay: Duration) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = spawn_server(move |_req: Request<Incoming>| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Full::new(Bytes::from(
                    json!({ "preferred_username": "bob", "roles": ["execute"] }).to_string(),
                )))
                .unwrap()
        }
    })
    .await;
    (format!("http://{}/protocol/openid-connect/userinfo", addr), hits)
}

fn userinfo(uri: &str, jwks_uri: &str, timeout: Duration) -> UserinfoVerifier {
    UserinfoVerifier::new(reqwest::Client::new(), uri, timeout, Arc::new(local(jwks_uri)))
}

#[tokio::test]
async fn test_userinfo_success() {
    let (jwks_uri, jwks_hits) = spawn_jwks(jwks()).await;
    let (uri, _) = spawn_userinfo(StatusCode::OK, Duration::ZERO).await;

    let verification = userinfo(&uri, &jwks_uri, Duration::from_secs(1))
        .verify("opaque")
        .await
        .unwrap();
    assert!(verification.active);
    assert_eq!(verification.claims.unwrap()["preferred_username"], "bob");
    assert_eq!(jwks_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_userinfo_rejection_is_inactive_without_fallback() {
    let (jwks_uri, jwks_hits) = spawn_jwks(jwks()).await;
    let (uri, _) = spawn_userinfo(StatusCode::UNAUTHORIZED, Duration::ZERO).await;

    let token = sign(&claims(300), Some(KID));
    let verification = userinfo(&uri, &jwks_uri, Duration::from_secs(1)).verify(&token).await.unwrap();
    assert!(!verification.active);
    assert_eq!(jwks_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_userinfo_timeout_falls_back_to_local() {
    let (jwks_uri, jwks_hits) = spawn_jwks(jwks()).await;
    let (uri, _) = spawn_userinfo(StatusCode::OK, Duration::from_secs(2)).await;

    let token = sign(&claims(300), Some(KID));
    let verification = userinfo(&uri, &jwks_uri, Duration::from_millis(100))
        .verify(&token)
        .await
        .unwrap();
    assert!(verification.active);
    assert_eq!(verification.claims.unwrap()["preferred_username"], "alice");
    assert_eq!(jwks_hits.load(Ordering::SeqCst), 1);
}

fn resolver(verifier: Arc<dyn TokenVerifier>, ttl: Duration) -> IdentityResolver {
    IdentityResolver::new(
        verifier,
        Arc::new(VerificationCache::new(ttl)),
        ClaimMapper::new(&ClaimSettings::default(), "caskfs"),
        Arc::new(MemorySessionStore::new()),
        "anduin-sid",
    )
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", format!("Bearer {}", token).parse().unwrap());
    headers
}

#[tokio::test]
async fn test_resolver_maps_claims_from_jwt() {
    let (jwks_uri, _) = spawn_jwks(jwks()).await;
    let resolver = resolver(Arc::new(local(&jwks_uri)), Duration::from_secs(30));

    let token = sign(&claims(300), Some(KID));
    let identity = resolver.resolve(&bearer(&token), None).await.unwrap();
    assert_eq!(identity.username.as_deref(), Some("alice"));
    assert_eq!(identity.first_name.as_deref(), Some("Alice"));
    assert_eq!(identity.last_name.as_deref(), Some("Liddell"));
    for role in ["admin", "offline_access", "viewer", "alice"] {
        assert!(identity.has_role(role), "missing role {}", role);
    }
}

#[tokio::test]
async fn test_concurrent_userinfo_resolution_issues_one_call() {
    let (jwks_uri, _) = spawn_jwks(jwks()).await;
    let (uri, hits) = spawn_userinfo(StatusCode::OK, Duration::from_millis(200)).await;
    let resolver = Arc::new(resolver(
        Arc::new(userinfo(&uri, &jwks_uri, Duration::from_secs(1))),
        Duration::from_secs(30),
    ));

    let headers = bearer("opaque-token");
    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let resolver = resolver.clone();
            let headers = headers.clone();
            tokio::spawn(async move { resolver.resolve(&headers, None).await })
        })
        .collect();

    for task in tasks {
        let identity = task.await.unwrap().unwrap();
        assert_eq!(identity.username.as_deref(), Some("bob"));
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_verification_expires_after_ttl() {
    let (jwks_uri, _) = spawn_jwks(jwks()).await;
    let (uri, hits) = spawn_userinfo(StatusCode::OK, Duration::ZERO).await;
    let resolver = resolver(
        Arc::new(userinfo(&uri, &jwks_uri, Duration::from_secs(1))),
        Duration::from_millis(200),
    );

    let headers = bearer("opaque-token");
    assert!(resolver.resolve(&headers, None).await.is_some());
    assert!(resolver.resolve(&headers, None).await.is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(resolver.resolve(&headers, None).await.is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_both_strategies_failing_is_anonymous_and_not_cached() {
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let resolver = resolver(
        Arc::new(userinfo(
            &format!("http://{}/userinfo", closed),
            &format!("http://{}/certs", closed),
            Duration::from_millis(200),
        )),
        Duration::from_secs(30),
    );

    let token = sign(&claims(300), Some(KID));
    assert!(resolver.resolve(&bearer(&token), None).await.is_none());
    assert!(resolver.cache().is_empty());
}
