use std::collections::HashMap;
use std::convert::Infallible;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use tracing::debug;
use uuid::Uuid;
use crate::{
    identity::Identity,
    logging::{log_request, RequestLog},
    middleware::{handle_middleware_error, MiddlewareChain},
    proxy::{error_response, redirect_response, text_response, ConnectionInfo, GatewayBody, ProxyClient},
    routing::ServiceTable,
};

const HEALTH_PATH: &str = "/health";

/// 요청 한 건을 파이프라인 순서대로 처리합니다.
///
/// 미들웨어 체인 → 수동 리다이렉트 → 서비스 라우팅 → 프록시
pub struct RequestHandler {
    chain: MiddlewareChain,
    services: ServiceTable,
    proxy: ProxyClient,
    manual_redirects: HashMap<String, String>,
    referer_requires_identity: bool,
}

impl RequestHandler {
    pub fn new(
        chain: MiddlewareChain,
        services: ServiceTable,
        proxy: ProxyClient,
        manual_redirects: &HashMap<String, String>,
    ) -> Self {
        let manual_redirects = manual_redirects
            .iter()
            .map(|(from, to)| (normalize_path(from).to_string(), to.clone()))
            .collect();

        Self {
            chain,
            services,
            proxy,
            manual_redirects,
            referer_requires_identity: true,
        }
    }

    /// 참이면 신원이 확인된 요청만 Referer로 서비스를 찾습니다.
    pub fn with_referer_requires_identity(mut self, required: bool) -> Self {
        self.referer_requires_identity = required;
        self
    }

    pub fn services(&self) -> &ServiceTable {
        &self.services
    }

    pub async fn handle_request(
        &self,
        req: Request<Incoming>,
        info: ConnectionInfo,
    ) -> Result<Response<GatewayBody>, Infallible> {
        let mut req = req.map(|body| body.boxed());
        req.extensions_mut().insert(info);
        Ok(self.dispatch(req).await)
    }

    /// 요청 기록을 남기며 파이프라인을 실행합니다.
    pub async fn dispatch(&self, req: Request<GatewayBody>) -> Response<GatewayBody> {
        let mut log = RequestLog::new(Uuid::new_v4().to_string());
        log.with_request(&req);

        let response = self.process(req, &mut log).await;

        log.with_response(response.status());
        log_request(&log);
        response
    }

    async fn process(&self, req: Request<GatewayBody>, log: &mut RequestLog) -> Response<GatewayBody> {
        let req = match self.chain.handle_request(req).await {
            Ok(req) => req,
            Err(e) => return handle_middleware_error(e),
        };

        let identity = req.extensions().get::<Identity>().cloned();
        log.with_user(identity.as_ref().and_then(|i| i.username.as_deref()));

        if let Some(location) = self.manual_redirects.get(normalize_path(req.uri().path())) {
            debug!(path = %req.uri().path(), location = %location, "수동 리다이렉트");
            return redirect_response(location);
        }

        // 게이트웨이가 직접 응답하는 헬스 경로는 Referer로 가로채지 않음
        let use_referer = req.uri().path() != HEALTH_PATH
            && (identity.is_some() || !self.referer_requires_identity);

        let response = match self.services.route_request(&req, use_referer) {
            Some(route) => {
                log.with_service(&route.service.name);
                match self.proxy.forward(req, &route, identity.as_ref()).await {
                    Ok(response) => response,
                    Err(e) => {
                        log.with_error(&e);
                        error_response(&e)
                    }
                }
            }
            None => fallback_response(&req),
        };

        match self.chain.handle_response(response).await {
            Ok(response) => response,
            Err(e) => handle_middleware_error(e),
        }
    }

    pub async fn handle_connection<I>(&self, io: I, info: ConnectionInfo) -> Result<(), hyper::Error>
    where
        I: hyper::rt::Read + hyper::rt::Write + Send + Unpin + 'static,
    {
        http1::Builder::new()
            .serve_connection(io, service_fn(|req| self.handle_request(req, info)))
            .with_upgrades()
            .await
    }
}

/// 서비스가 가져가지 않은 경로: 헬스 체크 또는 404
fn fallback_response<B>(req: &Request<B>) -> Response<GatewayBody> {
    let is_health = req.uri().path() == HEALTH_PATH
        && (req.method() == Method::GET || req.method() == Method::HEAD);

    if is_health {
        text_response(StatusCode::OK, "OK")
    } else {
        text_response(StatusCode::NOT_FOUND, "Not Found")
    }
}

/// 끝의 `/`를 제거합니다. 루트 경로는 그대로 둡니다.
fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use hyper::header::{self, HeaderName};
    use crate::proxy::{empty, ResponseTransformer};
    use crate::routing::{PrefixMatcher, RoleMapping, ServiceDescriptor};

    fn proxy() -> ProxyClient {
        ProxyClient::new(
            Duration::from_secs(1),
            ResponseTransformer::new(false, "", false),
            HeaderName::from_static("x-anduin-user"),
            "/auth/logout",
            false,
        )
    }

    fn handler(redirects: &[(&str, &str)]) -> RequestHandler {
        let redirects = redirects
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        RequestHandler::new(MiddlewareChain::new(), ServiceTable::new(true), proxy(), &redirects)
    }

    fn request(method: Method, uri: &str) -> Request<GatewayBody> {
        Request::builder().method(method).uri(uri).body(empty()).unwrap()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/docs/"), "/docs");
        assert_eq!(normalize_path("/docs//"), "/docs");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/docs"), "/docs");
    }

    #[tokio::test]
    async fn test_health_and_not_found() {
        let handler = handler(&[]);
        assert_eq!(handler.dispatch(request(Method::GET, "/health")).await.status(), StatusCode::OK);
        assert_eq!(handler.dispatch(request(Method::HEAD, "/health")).await.status(), StatusCode::OK);
        assert_eq!(handler.dispatch(request(Method::POST, "/health")).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(handler.dispatch(request(Method::GET, "/nowhere")).await.status(), StatusCode::NOT_FOUND);
    }

    fn table_with_unreachable_service() -> ServiceTable {
        let mut table = ServiceTable::new(true);
        table
            .register(ServiceDescriptor {
                name: "cask".to_string(),
                backend_url: "http://127.0.0.1:1".to_string(),
                matcher: PrefixMatcher::new("/cask").unwrap(),
                auth_required: false,
                allowed_roles: Vec::new(),
                logout_path: None,
                strip_path_prefix: false,
                role_mapping: RoleMapping::AllowedIntersection,
            })
            .unwrap();
        table
    }

    fn referer_request(path: &str) -> Request<GatewayBody> {
        Request::builder()
            .uri(path)
            .header(header::REFERER, "/cask/files")
            .body(empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_referer_needs_identity() {
        let handler = RequestHandler::new(
            MiddlewareChain::new(),
            table_with_unreachable_service(),
            proxy(),
            &HashMap::new(),
        );
        assert_eq!(handler.dispatch(referer_request("/static/app.js")).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(handler.dispatch(referer_request("/health")).await.status(), StatusCode::OK);

        let mut with_identity = referer_request("/static/app.js");
        with_identity.extensions_mut().insert(Identity {
            username: Some("alice".to_string()),
            email: None,
            first_name: None,
            last_name: None,
            roles: Default::default(),
        });
        assert_eq!(handler.dispatch(with_identity).await.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_referer_without_auth_still_skips_health() {
        let handler = RequestHandler::new(
            MiddlewareChain::new(),
            table_with_unreachable_service(),
            proxy(),
            &HashMap::new(),
        )
        .with_referer_requires_identity(false);
        assert_eq!(handler.dispatch(referer_request("/static/app.js")).await.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(handler.dispatch(referer_request("/health")).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_manual_redirect_ignores_trailing_slash() {
        let handler = handler(&[("/docs/", "https://docs.example.org")]);
        let response = handler.dispatch(request(Method::GET, "/docs/")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://docs.example.org");

        let response = handler.dispatch(request(Method::GET, "/docs?x=1")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
    }
}
