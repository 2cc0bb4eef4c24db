//! 프록시 전에 실행되는 요청 단계들
//!
//! 헤더 정리, 신원 확인, 접근 정책 순서로 체인에 등록됩니다.

pub mod access;
pub mod chain;
pub mod error;
pub mod identity;
pub mod response;
pub mod sanitize;
pub mod traits;

pub use access::AccessMiddleware;
pub use chain::MiddlewareChain;
pub use error::MiddlewareError;
pub use identity::IdentityMiddleware;
pub use response::handle_middleware_error;
pub use sanitize::{HeaderSanitizer, SanitizeMiddleware};
pub use traits::Middleware;

use crate::proxy::GatewayBody;

pub type Request = hyper::Request<GatewayBody>;
pub type Response = hyper::Response<GatewayBody>;
