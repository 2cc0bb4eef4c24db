use async_trait::async_trait;
use bytes::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::StatusCode;
use tracing::debug;
use crate::identity::Identity;
use crate::policy::{AccessDecision, AccessPolicy};
use crate::proxy::{full, redirect_response};
use super::{Middleware, MiddlewareError, Request, Response};

/// 접근 정책을 평가하여 리다이렉트나 권한 없음 페이지로 요청을 끝냅니다.
pub struct AccessMiddleware {
    policy: AccessPolicy,
    unauthorized_page: Bytes,
}

impl AccessMiddleware {
    pub fn new(policy: AccessPolicy, unauthorized_page: Bytes) -> Self {
        Self {
            policy,
            unauthorized_page,
        }
    }

    fn unauthorized_page_response(&self) -> Response {
        let mut response = hyper::Response::new(full(self.unauthorized_page.clone()));
        *response.status_mut() = StatusCode::OK;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response
    }
}

#[async_trait]
impl Middleware for AccessMiddleware {
    fn name(&self) -> &str {
        "access"
    }

    async fn handle_request(&self, req: Request) -> Result<Request, MiddlewareError> {
        let path = req.uri().path();
        let original_url = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or(path);

        let decision = self
            .policy
            .authorize(path, original_url, req.extensions().get::<Identity>());

        match decision {
            AccessDecision::Allow => Ok(req),
            AccessDecision::ServeUnauthorizedPage => {
                Err(MiddlewareError::Terminal(self.unauthorized_page_response()))
            }
            AccessDecision::RedirectToLogin { location } => {
                debug!(path = %path, "인증되지 않은 요청, 로그인으로 리다이렉트");
                Err(MiddlewareError::Terminal(redirect_response(&location)))
            }
            AccessDecision::RedirectToUnauthorized { location } => {
                Err(MiddlewareError::Terminal(redirect_response(&location)))
            }
        }
    }
}
