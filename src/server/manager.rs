use std::sync::Arc;
use std::time::Duration;
use hyper::header::HeaderName;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::{
    identity::{build_verifier, ClaimMapper, IdentityResolver, TokenVerifier, VerificationCache},
    middleware::{AccessMiddleware, HeaderSanitizer, IdentityMiddleware, MiddlewareChain, SanitizeMiddleware},
    policy::{load_unauthorized_page, AccessPolicy},
    proxy::{ProxyClient, ResponseTransformer},
    routing::{ServiceDescriptor, ServiceTable},
    session::SessionStore,
    settings::Settings,
};
use super::{
    error::Error,
    handler::RequestHandler,
    listener::ServerListener,
    Result,
};

/// 만료된 검증 결과를 정리하는 주기
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ServerManager {
    pub settings: Settings,
    handler: Arc<RequestHandler>,
    verification_cache: Option<Arc<VerificationCache>>,
}

impl ServerManager {
    /// 설정에 맞는 검증기로 매니저를 만듭니다.
    pub async fn new(settings: Settings, sessions: Arc<dyn SessionStore>) -> Result<Self> {
        let verifier = if settings.auth.enabled {
            Some(build_verifier(&settings.oidc)?)
        } else {
            None
        };
        Self::with_verifier(settings, sessions, verifier).await
    }

    /// 검증기를 직접 지정합니다. 인증이 꺼져 있으면 무시됩니다.
    pub async fn with_verifier(
        settings: Settings,
        sessions: Arc<dyn SessionStore>,
        verifier: Option<Arc<dyn TokenVerifier>>,
    ) -> Result<Self> {
        let auth = &settings.auth;

        // 1. 헤더 정리는 항상 첫 단계
        let mut chain = MiddlewareChain::new();
        chain.add(SanitizeMiddleware::new(HeaderSanitizer::from_settings(auth)));

        // 2. 신원 확인과 접근 정책
        let mut verification_cache = None;
        match verifier {
            Some(verifier) if auth.enabled => {
                let cache = Arc::new(VerificationCache::new(settings.oidc.token_cache_ttl()));
                let resolver = IdentityResolver::new(
                    verifier,
                    cache.clone(),
                    ClaimMapper::new(&settings.oidc.claims, &auth.filesystem_role_prefix),
                    sessions,
                    auth.session_cookie.clone(),
                );
                chain.add(IdentityMiddleware::new(Arc::new(resolver)));

                let page = load_unauthorized_page(auth.unauthorized_page_file.as_deref()).await;
                chain.add(AccessMiddleware::new(AccessPolicy::from_settings(auth)?, page));
                verification_cache = Some(cache);
            }
            _ => warn!("인증 비활성화: 신원 확인과 접근 정책을 건너뜀"),
        }

        // 3. 서비스 테이블
        let mut services = ServiceTable::new(settings.proxy.referer_fallback);
        for service in settings.enabled_services() {
            services.register(ServiceDescriptor::from_settings(
                service,
                &auth.filesystem_role_prefix,
                &auth.admin_role,
            )?)?;
        }
        info!(services = services.services().len(), middlewares = ?chain.names(), "파이프라인 구성 완료");

        // 4. 프록시
        let trusted_header = HeaderName::from_bytes(auth.trusted_header.as_bytes()).map_err(|e| {
            Error::InvalidHeader {
                name: auth.trusted_header.clone(),
                reason: e.to_string(),
            }
        })?;
        let proxy = ProxyClient::new(
            settings.proxy.upstream_timeout(),
            ResponseTransformer::from_settings(&settings.proxy),
            trusted_header,
            auth.logout_path.clone(),
            auth.enabled,
        );

        let handler = Arc::new(
            RequestHandler::new(chain, services, proxy, &settings.proxy.manual_redirects)
                .with_referer_requires_identity(auth.enabled),
        );

        Ok(Self {
            settings,
            handler,
            verification_cache,
        })
    }

    pub fn handler(&self) -> Arc<RequestHandler> {
        self.handler.clone()
    }

    pub fn verification_cache(&self) -> Option<&Arc<VerificationCache>> {
        self.verification_cache.as_ref()
    }

    /// 만료된 검증 결과를 주기적으로 정리하는 태스크를 시작합니다.
    pub fn spawn_cache_sweeper(&self, every: Duration) -> Option<JoinHandle<()>> {
        let cache = self.verification_cache.clone()?;
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = cache.evict_expired();
                if evicted > 0 {
                    debug!(evicted = evicted, remaining = cache.len(), "만료된 검증 결과 정리");
                }
            }
        }))
    }

    pub async fn run(self) -> Result<()> {
        let listener = ServerListener::new(&self.settings).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: ServerListener) -> Result<()> {
        let _sweeper = self.spawn_cache_sweeper(CACHE_SWEEP_INTERVAL);
        listener.run(self.handler.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::settings::ServiceSettings;

    fn service(name: &str, prefix: &str) -> ServiceSettings {
        ServiceSettings {
            name: name.to_string(),
            enabled: true,
            url: format!("http://{}:8080", name),
            path_prefix: prefix.to_string(),
            allowed_roles: vec!["admin".to_string()],
            auth_required: true,
            logout_path: None,
            strip_path_prefix: false,
            role_mapping: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_auth_disabled_builds_without_identity_provider() {
        let mut settings = Settings::default();
        settings.auth.enabled = false;
        settings.services = vec![service("dagster", "/dagster")];

        let manager = ServerManager::new(settings, Arc::new(MemorySessionStore::new())).await.unwrap();
        assert!(manager.verification_cache().is_none());
        assert!(manager.spawn_cache_sweeper(Duration::from_secs(1)).is_none());
        assert_eq!(manager.handler().services().services().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_services_are_not_registered() {
        let mut settings = Settings::default();
        settings.auth.enabled = false;
        let mut disabled = service("superset", "/superset");
        disabled.enabled = false;
        settings.services = vec![service("dagster", "/dagster"), disabled];

        let manager = ServerManager::new(settings, Arc::new(MemorySessionStore::new())).await.unwrap();
        let names: Vec<_> = manager
            .handler()
            .services()
            .services()
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(names, vec!["dagster".to_string()]);
    }

    #[tokio::test]
    async fn test_https_backend_rejected() {
        let mut settings = Settings::default();
        settings.auth.enabled = false;
        let mut tls_backend = service("cask", "/cask");
        tls_backend.url = "https://cask:8443".to_string();
        settings.services = vec![tls_backend];

        let result = ServerManager::new(settings, Arc::new(MemorySessionStore::new())).await;
        assert!(matches!(result, Err(Error::Routing(_))));
    }
}
