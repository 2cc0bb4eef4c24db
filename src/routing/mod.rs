//! 경로 접두사 기반으로 요청을 백엔드 서비스에 연결합니다.

mod error;
mod matcher;
mod service;
mod table;

pub use error::RoutingError;
pub use matcher::PrefixMatcher;
pub use service::{RoleMapping, ServiceDescriptor};
pub use table::{RouteMatch, ServiceTable};
