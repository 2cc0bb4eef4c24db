use std::fmt;

/// 서비스 테이블 구성 시 발생하는 에러
#[derive(Debug, PartialEq)]
pub enum RoutingError {
    /// 잘못된 경로 접두사
    InvalidPrefix {
        prefix: String,
        reason: String,
    },
    /// 잘못된 백엔드 URL
    InvalidBackendUrl {
        url: String,
        reason: String,
    },
    /// 이름 또는 접두사가 겹치는 서비스
    DuplicateService {
        name: String,
    },
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::InvalidPrefix { prefix, reason } =>
                write!(f, "잘못된 경로 접두사 {}: {}", prefix, reason),
            RoutingError::InvalidBackendUrl { url, reason } =>
                write!(f, "잘못된 백엔드 URL {}: {}", url, reason),
            RoutingError::DuplicateService { name } =>
                write!(f, "중복된 서비스: {}", name),
        }
    }
}

impl std::error::Error for RoutingError {}
