use std::net::SocketAddr;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::Request;

/// 프록시 구간마다 새로 정해지는 헤더
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// 커넥션 정보. 리스너가 요청 확장에 넣어 둡니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub remote_addr: SocketAddr,
    pub tls: bool,
}

/// `Connection: upgrade`와 `Upgrade` 헤더가 모두 있는 요청인지 확인
pub fn is_upgrade_request<B>(req: &Request<B>) -> bool {
    req.headers().contains_key(header::UPGRADE) && connection_has_token(req.headers(), "upgrade")
}

fn connection_has_token(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// hop-by-hop 헤더와 `Connection`에 나열된 헤더를 제거합니다.
///
/// `keep_upgrade`면 업그레이드 협상에 필요한 `Connection`과 `Upgrade`는 남깁니다.
pub fn remove_hop_by_hop(headers: &mut HeaderMap, keep_upgrade: bool) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|item| HeaderName::from_bytes(item.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        if keep_upgrade && name == header::UPGRADE {
            continue;
        }
        headers.remove(name);
    }

    for name in HOP_BY_HOP {
        if keep_upgrade && (name == "connection" || name == "upgrade") {
            continue;
        }
        headers.remove(name);
    }

    if keep_upgrade {
        headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    }
}

/// 인바운드 값은 정리 단계에서 이미 제거되었으므로 새로 설정합니다.
pub fn set_forwarded_headers(headers: &mut HeaderMap, info: Option<&ConnectionInfo>, host: Option<&HeaderValue>) {
    if let Some(info) = info {
        if let Ok(value) = HeaderValue::from_str(&info.remote_addr.ip().to_string()) {
            headers.insert(HeaderName::from_static("x-forwarded-for"), value);
        }
        let proto = if info.tls { "https" } else { "http" };
        headers.insert(HeaderName::from_static("x-forwarded-proto"), HeaderValue::from_static(proto));
    }

    if let Some(host) = host {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }
}
