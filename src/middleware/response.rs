use hyper::StatusCode;
use tracing::error;
use crate::proxy::text_response;
use super::{MiddlewareError, Response};

/// 미들웨어 에러를 HTTP 응답으로 변환합니다.
pub fn handle_middleware_error(err: MiddlewareError) -> Response {
    match err {
        MiddlewareError::Terminal(response) => response,
        other => {
            error!(error = %other, "미들웨어 처리 실패");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}
