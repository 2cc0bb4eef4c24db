/// 토큰 검증 중 발생하는 일시적 오류
///
/// 여기에 해당하는 오류는 캐시하지 않습니다. 서명 불일치나 만료처럼 확정적인 실패는
/// 오류가 아니라 `Verification::inactive`로 표현됩니다.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    #[error("공개 키 세트 조회 실패: {0}")]
    KeySetUnavailable(String),

    #[error("userinfo 요청 시간 초과 ({0}ms)")]
    Timeout(u64),

    #[error("IdP 통신 오류: {0}")]
    Transport(String),

    #[error("IdP 설정 누락: {0}")]
    Misconfigured(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::Transport(err.to_string())
    }
}
