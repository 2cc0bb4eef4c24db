//! Auth Gateway는 여러 백엔드 서비스 앞에서 신원 확인과 접근 제어를 맡는 경량 리버스 프록시입니다.
//!
//! # 요청 처리 순서
//!
//! 1. 헤더 정리: 클라이언트가 보낸 `x-` 헤더를 제거
//! 2. 신원 확인: 세션 쿠키 또는 Bearer 토큰을 검증하고 클레임을 `Identity`로 변환
//! 3. 접근 정책: 공개 경로, 로그인 리다이렉트, 권한 없음 페이지 결정
//! 4. 서비스 라우팅: 경로 접두사 (없으면 Referer) 로 백엔드 선택
//! 5. 프록시: 신원 헤더를 실어 전달하고 HTML 응답에 스니펫 삽입
//!
//! # 예제
//!
//! ```
//! use auth_gateway::routing::{PrefixMatcher, ServiceTable};
//!
//! let matcher = PrefixMatcher::new("/superset").unwrap();
//! assert!(matcher.matches("/superset/welcome"));
//! assert!(!matcher.matches("/supersetx"));
//!
//! let table = ServiceTable::new(true);
//! assert!(table.find("/superset", None).is_none());
//! ```

pub mod identity;
pub mod logging;
pub mod middleware;
pub mod policy;
pub mod proxy;
pub mod routing;
pub mod server;
pub mod session;
pub mod settings;
pub mod tls;
