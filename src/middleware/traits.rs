use super::{Request, Response, MiddlewareError};
use async_trait::async_trait;

/// 미들웨어 트레이트
///
/// 요청을 수정하거나 `MiddlewareError::Terminal`로 파이프라인을 끝낼 수 있습니다.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// 미들웨어의 고유 이름을 반환합니다.
    fn name(&self) -> &str;

    /// HTTP 요청을 처리합니다.
    async fn handle_request(&self, req: Request) -> Result<Request, MiddlewareError>;

    /// HTTP 응답을 처리합니다. 기본 구현은 응답을 그대로 돌려줍니다.
    async fn handle_response(&self, res: Response) -> Result<Response, MiddlewareError> {
        Ok(res)
    }
}
