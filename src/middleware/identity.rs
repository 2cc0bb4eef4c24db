use std::sync::Arc;
use async_trait::async_trait;
use tracing::debug;
use crate::identity::{Identity, IdentityResolver};
use super::{Middleware, MiddlewareError, Request};

/// 자격 증명을 검증하고 결과 신원을 요청 확장에 붙입니다.
///
/// 신원이 없어도 요청은 계속 진행되며, 판단은 접근 정책 단계가 합니다.
pub struct IdentityMiddleware {
    resolver: Arc<IdentityResolver>,
}

impl IdentityMiddleware {
    pub fn new(resolver: Arc<IdentityResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Middleware for IdentityMiddleware {
    fn name(&self) -> &str {
        "identity"
    }

    async fn handle_request(&self, mut req: Request) -> Result<Request, MiddlewareError> {
        let resolved = {
            let headers = req.headers();
            let attached = req.extensions().get::<Identity>();
            self.resolver.resolve(headers, attached).await
        };

        if let Some(identity) = resolved {
            debug!(user = ?identity.username, roles = identity.roles.len(), "신원 확인");
            req.extensions_mut().insert(identity);
        }
        Ok(req)
    }
}
