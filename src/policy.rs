//! 신원과 경로를 기준으로 요청의 진행 여부를 결정합니다.

use std::path::Path;
use bytes::Bytes;
use regex_lite::Regex;
use tracing::{debug, warn};
use url::form_urlencoded;
use crate::identity::Identity;
use crate::routing::ServiceDescriptor;
use crate::settings::AuthSettings;

const DEFAULT_UNAUTHORIZED_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Unauthorized</title></head>
<body>
<h1>Unauthorized</h1>
<p>Your account does not have access to this application.</p>
<p><a href="/auth/logout">Sign out</a></p>
</body>
</html>
"#;

/// 정책 평가 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    /// 권한 없음 페이지를 직접 응답
    ServeUnauthorizedPage,
    /// 로그인 경로로 리다이렉트 (`redirect` 쿼리에 원래 URL)
    RedirectToLogin { location: String },
    /// 권한 없음 페이지로 리다이렉트
    RedirectToUnauthorized { location: String },
}

/// 인증 없이 통과하는 경로 패턴 목록
#[derive(Debug, Clone)]
pub struct PublicPathSet {
    patterns: Vec<Regex>,
}

impl PublicPathSet {
    /// 설정된 패턴 앞에 권한 없음 페이지 패턴을 추가합니다.
    pub fn new(patterns: &[String], unauthorized_page: &str) -> Result<Self, regex_lite::Error> {
        let mut compiled = vec![Regex::new(&format!("^{}", regex_lite::escape(unauthorized_page)))?];
        for pattern in patterns {
            compiled.push(Regex::new(pattern)?);
        }
        Ok(Self { patterns: compiled })
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(path))
    }
}

pub struct AccessPolicy {
    public_paths: PublicPathSet,
    unauthorized_page: String,
    login_path: String,
    allowed_roles: Vec<String>,
    namespace_prefix: String,
}

impl AccessPolicy {
    pub fn from_settings(settings: &AuthSettings) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            public_paths: PublicPathSet::new(&settings.public_paths, &settings.unauthorized_page)?,
            unauthorized_page: settings.unauthorized_page.clone(),
            login_path: settings.login_path.clone(),
            allowed_roles: settings.allowed_roles.clone(),
            namespace_prefix: format!("{}-", settings.filesystem_role_prefix),
        })
    }

    pub fn unauthorized_page(&self) -> &str {
        &self.unauthorized_page
    }

    /// 경로와 신원으로 접근을 판단합니다.
    ///
    /// `original_url`은 경로와 쿼리를 포함한 원래 요청 URL입니다.
    pub fn authorize(&self, path: &str, original_url: &str, identity: Option<&Identity>) -> AccessDecision {
        if path == self.unauthorized_page {
            return AccessDecision::ServeUnauthorizedPage;
        }

        if self.public_paths.is_public(path) {
            debug!(path = %path, "공개 경로");
            return AccessDecision::Allow;
        }

        let Some(identity) = identity else {
            return AccessDecision::RedirectToLogin {
                location: self.login_redirect(original_url),
            };
        };

        if !self.has_gateway_role(identity) {
            warn!(
                user = ?identity.username,
                roles = ?identity.roles,
                path = %path,
                "게이트웨이 접근 역할 없음"
            );
            return AccessDecision::RedirectToUnauthorized {
                location: self.unauthorized_page.clone(),
            };
        }

        AccessDecision::Allow
    }

    pub fn login_redirect(&self, original_url: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect", original_url)
            .finish();
        format!("{}?{}", self.login_path, query)
    }

    fn has_gateway_role(&self, identity: &Identity) -> bool {
        identity.roles.iter().any(|role| {
            role.starts_with(&self.namespace_prefix)
                || self.allowed_roles.iter().any(|a| a.eq_ignore_ascii_case(role))
        })
    }
}

/// 서비스별 역할 검사. 인증이 필요 없는 서비스는 항상 통과합니다.
pub fn service_gate(service: &ServiceDescriptor, identity: Option<&Identity>) -> bool {
    if !service.auth_required {
        return true;
    }
    match identity {
        Some(identity) => service.allowed_roles.iter().any(|role| identity.has_role(role)),
        None => false,
    }
}

/// 권한 없음 페이지 HTML. 파일이 없거나 읽을 수 없으면 내장 페이지를 사용합니다.
pub async fn load_unauthorized_page(path: Option<&Path>) -> Bytes {
    if let Some(path) = path {
        match tokio::fs::read(path).await {
            Ok(content) => return Bytes::from(content),
            Err(e) => warn!(path = %path.display(), error = %e, "권한 없음 페이지 파일 읽기 실패, 내장 페이지 사용"),
        }
    }
    Bytes::from_static(DEFAULT_UNAUTHORIZED_PAGE.as_bytes())
}
