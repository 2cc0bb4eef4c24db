//! 백엔드 서비스로 요청을 전달하고 응답을 변환합니다.

mod encoding;
mod headers;
mod path;
mod rewrite;
mod upgrade;

pub use encoding::ContentEncoding;
pub use headers::{is_upgrade_request, remove_hop_by_hop, set_forwarded_headers, ConnectionInfo};
pub use path::{rewrite_path, service_relative_path};
pub use rewrite::{ResponseTransformer, DEFAULT_MAX_REWRITE_BYTES};

use std::convert::Infallible;
use std::time::Duration;
use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::header::{self, HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode, Uri};
use hyper_util::client::legacy::{self, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use tracing::{debug, error, warn};
use crate::identity::Identity;
use crate::policy::service_gate;
use crate::routing::RouteMatch;

/// 게이트웨이 전체에서 사용하는 본문 타입
pub type GatewayBody = BoxBody<Bytes, hyper::Error>;

pub fn full(chunk: impl Into<Bytes>) -> GatewayBody {
    Full::new(chunk.into())
        .map_err(|never: Infallible| -> hyper::Error { match never {} })
        .boxed()
}

pub fn empty() -> GatewayBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| -> hyper::Error { match never {} })
        .boxed()
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("백엔드 {target} 응답 시간 초과 ({timeout_secs}초)")]
    Timeout { target: String, timeout_secs: u64 },

    #[error("백엔드 {target} 요청 실패: {source}")]
    Transport {
        target: String,
        #[source]
        source: legacy::Error,
    },

    #[error("잘못된 백엔드 URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("백엔드 응답 본문 읽기 실패: {0}")]
    Body(#[from] hyper::Error),

    #[error("응답 생성 실패: {0}")]
    Http(#[from] hyper::http::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Transport { .. } | ProxyError::Body(_) => StatusCode::BAD_GATEWAY,
            ProxyError::InvalidUri { .. } | ProxyError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn error_response(err: &ProxyError) -> Response<GatewayBody> {
    let status = err.status();
    let message = status.canonical_reason().unwrap_or("Error").to_string();
    text_response(status, message)
}

pub fn text_response(status: StatusCode, message: impl Into<Bytes>) -> Response<GatewayBody> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full(message))
        .unwrap_or_else(|e| {
            error!(error = %e, "에러 응답 생성 실패");
            Response::new(full("Internal Server Error"))
        })
}

pub fn redirect_response(location: &str) -> Response<GatewayBody> {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = Response::new(empty());
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(e) => {
            error!(location = %location, error = %e, "리다이렉트 위치가 헤더 값으로 적합하지 않음");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

pub struct ProxyClient {
    client: legacy::Client<HttpConnector, GatewayBody>,
    timeout: Duration,
    transformer: ResponseTransformer,
    trusted_header: HeaderName,
    gateway_logout_path: String,
    enforce_service_roles: bool,
}

impl ProxyClient {
    pub fn new(
        timeout: Duration,
        transformer: ResponseTransformer,
        trusted_header: HeaderName,
        gateway_logout_path: impl Into<String>,
        enforce_service_roles: bool,
    ) -> Self {
        let connector = HttpConnector::new();
        let client = legacy::Client::builder(TokioExecutor::new())
            .build::<_, GatewayBody>(connector);

        Self {
            client,
            timeout,
            transformer,
            trusted_header,
            gateway_logout_path: gateway_logout_path.into(),
            enforce_service_roles,
        }
    }

    /// 요청을 서비스로 전달합니다.
    ///
    /// 로그아웃 경로는 게이트웨이 로그아웃으로 리다이렉트하고, 서비스 역할 검사에
    /// 실패하면 백엔드에 아무것도 보내지 않고 401을 반환합니다.
    pub async fn forward(
        &self,
        mut req: Request<GatewayBody>,
        route: &RouteMatch,
        identity: Option<&Identity>,
    ) -> Result<Response<GatewayBody>, ProxyError> {
        let service = &route.service;

        if let Some(logout_path) = &service.logout_path {
            if service_relative_path(req.uri().path(), service) == logout_path.as_str() {
                debug!(service = %service.name, "서비스 로그아웃을 게이트웨이 로그아웃으로 전환");
                return Ok(redirect_response(&self.gateway_logout_path));
            }
        }

        let target = format!("{}{}", service.backend_url, rewrite_path(req.uri(), service));
        let uri: Uri = target.parse().map_err(|e: hyper::http::uri::InvalidUri| ProxyError::InvalidUri {
            uri: target.clone(),
            reason: e.to_string(),
        })?;

        req.headers_mut().remove(&self.trusted_header);
        if let Some(identity) = identity {
            let scoped = Identity {
                roles: service.header_roles(identity),
                ..identity.clone()
            };
            match scoped.to_header_value() {
                Ok(json) => match HeaderValue::from_bytes(json.as_bytes()) {
                    Ok(value) => {
                        req.headers_mut().insert(self.trusted_header.clone(), value);
                    }
                    Err(e) => warn!(error = %e, "신원 헤더 값 생성 실패"),
                },
                Err(e) => warn!(error = %e, "신원 직렬화 실패"),
            }
        }

        if self.enforce_service_roles && !service_gate(service, identity) {
            warn!(
                service = %service.name,
                user = ?identity.and_then(|i| i.username.as_deref()),
                "서비스 접근 역할 없음"
            );
            return Ok(text_response(StatusCode::UNAUTHORIZED, "Unauthorized"));
        }

        let upgrade = is_upgrade_request(&req);
        let info = req.extensions().get::<ConnectionInfo>().copied();
        let method = req.method().clone();
        let host = req.headers().get(header::HOST).cloned();

        remove_hop_by_hop(req.headers_mut(), upgrade);
        set_forwarded_headers(req.headers_mut(), info.as_ref(), host.as_ref());
        *req.uri_mut() = uri;

        let client_upgrade = upgrade.then(|| hyper::upgrade::on(&mut req));
        debug!(upstream = %target, method = %method, via_referer = route.via_referer, "백엔드로 요청 전달");

        let result = tokio::time::timeout(self.timeout, self.client.request(req)).await;
        let mut response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                let err = ProxyError::Transport { target: target.clone(), source };
                error!(
                    upstream = %target,
                    method = %method,
                    client = ?info.map(|i| i.remote_addr),
                    error = %err,
                    "백엔드 요청 실패"
                );
                return Err(err);
            }
            Err(_) => {
                let err = ProxyError::Timeout {
                    target: target.clone(),
                    timeout_secs: self.timeout.as_secs(),
                };
                error!(
                    upstream = %target,
                    method = %method,
                    client = ?info.map(|i| i.remote_addr),
                    "백엔드 응답 시간 초과"
                );
                return Err(err);
            }
        };

        if let Some(client_upgrade) = client_upgrade {
            if response.status() == StatusCode::SWITCHING_PROTOCOLS {
                upgrade::bridge(client_upgrade, &mut response, target);
                return Ok(response.map(|body| body.boxed()));
            }
            debug!(upstream = %target, status = %response.status(), "백엔드가 업그레이드를 수락하지 않음");
        }

        if method == hyper::Method::HEAD {
            let (mut parts, body) = response.into_parts();
            remove_hop_by_hop(&mut parts.headers, false);
            return Ok(Response::from_parts(parts, body.boxed()));
        }

        self.transformer.transform(response).await
    }
}
