use async_trait::async_trait;
use hyper::header::HeaderName;
use hyper::HeaderMap;
use tracing::debug;
use crate::settings::AuthSettings;
use super::{Middleware, MiddlewareError, Request};

/// 게이트웨이만 설정할 수 있는 헤더 이름 공간을 정리합니다.
#[derive(Debug, Clone)]
pub struct HeaderSanitizer {
    prefix: String,
    allowed: Vec<String>,
}

impl HeaderSanitizer {
    pub fn new(prefix: &str, allowed: &[String]) -> Self {
        Self {
            prefix: prefix.to_ascii_lowercase(),
            allowed: allowed.iter().map(|name| name.to_ascii_lowercase()).collect(),
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        Self::new(&settings.trust_prefix, &settings.allowed_headers)
    }

    /// 접두사로 시작하는 헤더를 제거하고 제거한 헤더 수를 반환합니다.
    ///
    /// `HeaderName`은 항상 소문자이므로 접두사와 허용 목록만 소문자로 맞추면 됩니다.
    pub fn sanitize(&self, headers: &mut HeaderMap) -> usize {
        if self.prefix.is_empty() {
            return 0;
        }

        let doomed: Vec<HeaderName> = headers
            .keys()
            .filter(|name| self.is_reserved(name.as_str()))
            .cloned()
            .collect();

        for name in &doomed {
            headers.remove(name);
        }
        doomed.len()
    }

    fn is_reserved(&self, name: &str) -> bool {
        name.starts_with(&self.prefix) && !self.allowed.iter().any(|allowed| allowed == name)
    }
}

pub struct SanitizeMiddleware {
    sanitizer: HeaderSanitizer,
}

impl SanitizeMiddleware {
    pub fn new(sanitizer: HeaderSanitizer) -> Self {
        Self { sanitizer }
    }
}

#[async_trait]
impl Middleware for SanitizeMiddleware {
    fn name(&self) -> &str {
        "sanitize"
    }

    async fn handle_request(&self, mut req: Request) -> Result<Request, MiddlewareError> {
        let removed = self.sanitizer.sanitize(req.headers_mut());
        if removed > 0 {
            debug!(removed = removed, path = %req.uri().path(), "예약된 헤더 제거");
        }
        Ok(req)
    }
}
