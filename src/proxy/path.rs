use hyper::Uri;
use crate::routing::ServiceDescriptor;

/// 백엔드로 보낼 경로와 쿼리를 계산합니다.
///
/// Referer로 매칭된 요청처럼 접두사가 없는 경로에는 접두사를 붙이고,
/// 서비스가 접두사 제거를 요구하면 제거합니다. 쿼리는 그대로 유지합니다.
pub fn rewrite_path(uri: &Uri, service: &ServiceDescriptor) -> String {
    let path = uri.path();
    let prefixed = if service.matcher.matches(path) {
        path.to_string()
    } else {
        format!("{}{}", service.path_prefix(), path)
    };

    let mut rewritten = if service.strip_path_prefix {
        service.matcher.relative(&prefixed).to_string()
    } else {
        prefixed
    };

    if let Some(query) = uri.query() {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    rewritten
}

/// 접두사를 제외한 서비스 기준 경로
pub fn service_relative_path<'a>(path: &'a str, service: &ServiceDescriptor) -> &'a str {
    service.matcher.relative(path)
}
