use std::sync::Arc;
use tracing::debug;
use super::{Middleware, MiddlewareError, Request, Response};

/// 등록 순서대로 실행되는 미들웨어 체인
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        debug!(middleware = %middleware.name(), "미들웨어 추가");
        self.middlewares.push(Arc::new(middleware));
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub async fn handle_request(&self, mut request: Request) -> Result<Request, MiddlewareError> {
        for middleware in &self.middlewares {
            request = middleware.handle_request(request).await?;
        }
        Ok(request)
    }

    pub async fn handle_response(&self, mut response: Response) -> Result<Response, MiddlewareError> {
        // 응답은 역순으로 처리
        for middleware in self.middlewares.iter().rev() {
            response = middleware.handle_response(response).await?;
        }
        Ok(response)
    }
}
