use crate::identity::IdentityError;
use crate::routing::RoutingError;
use crate::settings::SettingsError;
use crate::tls::TlsError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("설정 오류: {0}")]
    Settings(#[from] SettingsError),

    #[error("서비스 등록 실패: {0}")]
    Routing(#[from] RoutingError),

    #[error("토큰 검증기 생성 실패: {0}")]
    Identity(#[from] IdentityError),

    #[error("공개 경로 패턴 오류: {0}")]
    Policy(#[from] regex_lite::Error),

    #[error("잘못된 헤더 이름 {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("IO 오류: {0}")]
    Io(#[from] std::io::Error),
}
