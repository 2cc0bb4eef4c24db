use std::{env, path::PathBuf};
use serde::Deserialize;
use super::{server::{parse_env_list, parse_env_var}, SettingsError};

/// 헤더 정리, 접근 정책, 세션 쿠키 관련 설정
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// 인증 활성화 여부. 비활성화하면 신원 확인과 접근 정책 단계를 건너뜁니다.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 게이트웨이만 설정할 수 있는 신원 헤더 이름
    #[serde(default = "default_trusted_header")]
    pub trusted_header: String,

    /// 인바운드 요청에서 제거할 헤더 접두사
    #[serde(default = "default_trust_prefix")]
    pub trust_prefix: String,

    /// 접두사가 일치해도 통과시킬 헤더 이름 (대소문자 무시)
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,

    /// 인증 없이 통과시킬 경로 정규식
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,

    /// 권한 없음 페이지 경로
    #[serde(default = "default_unauthorized_page")]
    pub unauthorized_page: String,

    /// 권한 없음 페이지 HTML 파일. 없으면 내장 페이지를 사용합니다.
    #[serde(default)]
    pub unauthorized_page_file: Option<PathBuf>,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_logout_path")]
    pub logout_path: String,

    /// 게이트웨이 접근이 허용되는 역할
    #[serde(default = "default_allowed_roles")]
    pub allowed_roles: Vec<String>,

    /// 파일시스템 네임스페이스 역할 접두사 (`caskfs-teamA` 형태)
    #[serde(default = "default_filesystem_role_prefix")]
    pub filesystem_role_prefix: String,

    /// 세션 쿠키 이름
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    /// 파일시스템 서비스로 그대로 전달되는 관리자 역할
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

fn default_true() -> bool { true }
fn default_trusted_header() -> String { "x-anduin-user".to_string() }
fn default_trust_prefix() -> String { "x-".to_string() }
fn default_allowed_headers() -> Vec<String> { vec!["x-csrftoken".to_string()] }
fn default_public_paths() -> Vec<String> {
    vec!["^/health(/|$)".to_string(), "^/auth(/|$)".to_string()]
}
fn default_unauthorized_page() -> String { "/unauthorized.html".to_string() }
fn default_login_path() -> String { "/auth/login".to_string() }
fn default_logout_path() -> String { "/auth/logout".to_string() }
fn default_allowed_roles() -> Vec<String> {
    ["admin", "dashboard", "dashboard-admin", "execute"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_filesystem_role_prefix() -> String { "caskfs".to_string() }
fn default_session_cookie() -> String { "anduin-sid".to_string() }
fn default_admin_role() -> String { "admin".to_string() }

impl AuthSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let admin_role = env::var("ADMIN_ROLE").unwrap_or_else(|_| default_admin_role());
        let mut allowed_roles = vec![
            admin_role.clone(),
            env::var("GATEWAY_DASHBOARD_ROLE").unwrap_or_else(|_| "dashboard".to_string()),
            env::var("GATEWAY_DASHBOARD_ADMIN_ROLE").unwrap_or_else(|_| "dashboard-admin".to_string()),
            env::var("GATEWAY_EXECUTE_ROLE").unwrap_or_else(|_| "execute".to_string()),
        ];
        allowed_roles.dedup();

        let settings = Self {
            enabled: parse_env_var("GATEWAY_AUTH_ENABLED", default_true)?,
            trusted_header: env::var("GATEWAY_AUTH_HEADER").unwrap_or_else(|_| default_trusted_header()),
            trust_prefix: env::var("GATEWAY_TRUST_PREFIX").unwrap_or_else(|_| default_trust_prefix()),
            allowed_headers: parse_env_list("GATEWAY_ALLOWED_HEADERS").unwrap_or_else(default_allowed_headers),
            public_paths: parse_env_list("GATEWAY_PUBLIC_PATHS").unwrap_or_else(default_public_paths),
            unauthorized_page: env::var("UNAUTHORIZED_PAGE").unwrap_or_else(|_| default_unauthorized_page()),
            unauthorized_page_file: env::var("UNAUTHORIZED_PAGE_FILE").ok().map(PathBuf::from),
            login_path: env::var("OIDC_LOGIN_PATH").unwrap_or_else(|_| default_login_path()),
            logout_path: env::var("OIDC_LOGOUT_PATH").unwrap_or_else(|_| default_logout_path()),
            allowed_roles,
            filesystem_role_prefix: env::var("GATEWAY_FILESYSTEM_ROLE_PREFIX")
                .unwrap_or_else(|_| default_filesystem_role_prefix()),
            session_cookie: env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| default_session_cookie()),
            admin_role,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.trusted_header.to_ascii_lowercase().starts_with(&self.trust_prefix.to_ascii_lowercase()) {
            // 접두사 밖의 헤더는 정리 대상이 아니므로 클라이언트가 위조할 수 있음
            return Err(SettingsError::InvalidConfig(format!(
                "신뢰 헤더 {}는 제거 접두사 {}로 시작해야 합니다",
                self.trusted_header, self.trust_prefix
            )));
        }

        if self.allowed_headers.iter().any(|h| h.eq_ignore_ascii_case(&self.trusted_header)) {
            return Err(SettingsError::InvalidConfig(format!(
                "신뢰 헤더 {}는 허용 목록에 포함될 수 없습니다",
                self.trusted_header
            )));
        }

        for pattern in &self.public_paths {
            regex_lite::Regex::new(pattern).map_err(|e| {
                SettingsError::InvalidConfig(format!("공개 경로 패턴 {} 오류: {}", pattern, e))
            })?;
        }

        for path in [&self.unauthorized_page, &self.login_path, &self.logout_path] {
            if !path.starts_with('/') {
                return Err(SettingsError::InvalidConfig(format!(
                    "경로는 /로 시작해야 합니다: {}",
                    path
                )));
            }
        }

        Ok(())
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            trusted_header: default_trusted_header(),
            trust_prefix: default_trust_prefix(),
            allowed_headers: default_allowed_headers(),
            public_paths: default_public_paths(),
            unauthorized_page: default_unauthorized_page(),
            unauthorized_page_file: None,
            login_path: default_login_path(),
            logout_path: default_logout_path(),
            allowed_roles: default_allowed_roles(),
            filesystem_role_prefix: default_filesystem_role_prefix(),
            session_cookie: default_session_cookie(),
            admin_role: default_admin_role(),
        }
    }
}
