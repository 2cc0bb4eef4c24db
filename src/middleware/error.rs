use crate::proxy::GatewayBody;

#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    #[error("설정 오류: {0}")]
    Config(String),

    #[error("미들웨어 {middleware} 실행 실패: {message}")]
    Execution {
        middleware: String,
        message: String,
    },

    /// 파이프라인을 끝내고 이 응답을 그대로 반환
    #[error("요청 종료 (상태 {})", .0.status())]
    Terminal(hyper::Response<GatewayBody>),
}
