#![allow(dead_code)]

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use auth_gateway::{
    identity::TokenVerifier,
    server::{ServerListener, ServerManager},
    session::{MemorySessionStore, SessionStore},
    settings::{ServiceSettings, Settings, RoleMappingKind},
};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const KID: &str = "test-key";
pub const RSA_N: &str = "reOR5VYMZRfAikCD6hvAeXtuWjtOETwKRfiMNVBPxrb1ouWv0WO_b0yKLqNB9iJlvBNQb47Q5w9Ip5kYItEz0-xut7gLsjjTdGjrITNgttsSOB_cYk4UjpWIQitD7KwjCS4j8P4Ay9byiwCxt24TFdp8-zQWOZTSEzWh5MSETgaEKu-B1Y59dcQDa7k4BJmSfBNntFazKEI1ulQ9aRug9l00hdG1IlVdnP5COwpTSfqY6UhmkgB1U1jIE5LZklmhGoqePtslybsHvwS9tSTL1EiWtQHhdfvg3WPv5Blciq8G544cDvbhjS8VGY83XIoxtq7eI4xTziM6RGKsuI3TYQ";
pub const RSA_E: &str = "AQAB";

/// 루프백 포트에 hyper 서버를 띄우고 주소를 반환합니다.
pub async fn spawn_server<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { continue };
            let handler = handler.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let handler = handler.clone();
                    async move { Ok::<_, Infallible>(handler(req).await) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades()
                    .await;
            });
        }
    });

    addr
}

/// 게이트웨이를 루프백 포트에 띄웁니다.
pub async fn spawn_gateway(settings: Settings, verifier: Option<Arc<dyn TokenVerifier>>) -> SocketAddr {
    spawn_gateway_with_sessions(settings, verifier, Arc::new(MemorySessionStore::new())).await
}

pub async fn spawn_gateway_with_sessions(
    settings: Settings,
    verifier: Option<Arc<dyn TokenVerifier>>,
    sessions: Arc<dyn SessionStore>,
) -> SocketAddr {
    let manager = ServerManager::with_verifier(settings, sessions, verifier).await.unwrap();
    let listener = ServerListener::bind("127.0.0.1:0", None).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(manager.serve(listener));
    addr
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

pub fn service(name: &str, backend: SocketAddr, prefix: &str, allowed_roles: &[&str]) -> ServiceSettings {
    ServiceSettings {
        name: name.to_string(),
        enabled: true,
        url: format!("http://{}", backend),
        path_prefix: prefix.to_string(),
        allowed_roles: allowed_roles.iter().map(|r| r.to_string()).collect(),
        auth_required: true,
        logout_path: None,
        strip_path_prefix: false,
        role_mapping: RoleMappingKind::AllowedIntersection,
    }
}

pub fn settings(services: Vec<ServiceSettings>) -> Settings {
    let mut settings = Settings::default();
    settings.services = services;
    settings
}

pub fn jwks() -> Value {
    json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": KID,
            "n": RSA_N,
            "e": RSA_E,
        }]
    })
}

pub fn now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// 테스트 키로 RS256 토큰을 서명합니다.
pub fn sign(claims: &Value, kid: Option<&str>) -> String {
    let pem = std::fs::read(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/test_rsa_key.pem")).unwrap();
    let key = EncodingKey::from_rsa_pem(&pem).unwrap();
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

pub fn json_response(value: &Value) -> Response<Full<Bytes>> {
    Response::builder()
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(value.to_string())))
        .unwrap()
}
