use std::sync::Arc;
use hyper::header;
use tracing::debug;
use crate::routing::{RoutingError, ServiceDescriptor};

/// 라우팅 결과
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub service: Arc<ServiceDescriptor>,
    /// 요청 경로가 아니라 Referer 경로로 찾았는지 여부
    pub via_referer: bool,
}

/// 등록 순서를 유지하는 서비스 테이블
#[derive(Debug, Clone, Default)]
pub struct ServiceTable {
    services: Vec<Arc<ServiceDescriptor>>,
    referer_fallback: bool,
}

impl ServiceTable {
    pub fn new(referer_fallback: bool) -> Self {
        Self {
            services: Vec::new(),
            referer_fallback,
        }
    }

    /// 서비스를 등록합니다. 이름이나 접두사가 겹치면 거부합니다.
    pub fn register(&mut self, service: ServiceDescriptor) -> Result<(), RoutingError> {
        let duplicate = self.services.iter().any(|s| {
            s.name == service.name || s.path_prefix() == service.path_prefix()
        });
        if duplicate {
            return Err(RoutingError::DuplicateService { name: service.name });
        }

        debug!(service = %service.name, prefix = %service.path_prefix(), "서비스 등록");
        self.services.push(Arc::new(service));
        Ok(())
    }

    pub fn services(&self) -> &[Arc<ServiceDescriptor>] {
        &self.services
    }

    /// 경로로 먼저 찾고, 없으면 Referer 경로로 찾습니다. 먼저 등록된 서비스가 우선합니다.
    pub fn find(&self, path: &str, referer_path: Option<&str>) -> Option<RouteMatch> {
        if let Some(service) = self.find_by_path(path) {
            return Some(RouteMatch { service, via_referer: false });
        }

        if !self.referer_fallback {
            return None;
        }

        let service = self.find_by_path(referer_path?)?;
        debug!(service = %service.name, path = %path, "Referer로 서비스 선택");
        Some(RouteMatch { service, via_referer: true })
    }

    /// 요청 경로로 서비스를 찾습니다. `use_referer`가 거짓이면 Referer는 보지 않습니다.
    pub fn route_request<B>(&self, req: &hyper::Request<B>, use_referer: bool) -> Option<RouteMatch> {
        let referer = req
            .headers()
            .get(header::REFERER)
            .filter(|_| use_referer)
            .and_then(|value| value.to_str().ok())
            .and_then(referer_path);
        self.find(req.uri().path(), referer.as_deref())
    }

    fn find_by_path(&self, path: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services
            .iter()
            .find(|service| service.matcher.matches(path))
            .cloned()
    }
}

/// Referer 헤더에서 경로만 추출합니다.
fn referer_path(referer: &str) -> Option<String> {
    if referer.starts_with('/') {
        let path = referer.split(['?', '#']).next().unwrap_or(referer);
        return Some(path.to_string());
    }
    url::Url::parse(referer).ok().map(|url| url.path().to_string())
}
