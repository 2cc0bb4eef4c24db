use std::env;
use std::time::Duration;
use serde::Deserialize;
use super::{server::{parse_env_list, parse_env_var}, SettingsError};

/// 토큰 검증 방식
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStrategy {
    /// 공개 키 세트(JWKS)로 서명을 직접 검증
    Jwks,
    /// IdP userinfo 엔드포인트에 질의하고, 실패하면 JWKS 검증으로 대체
    Userinfo,
}

impl Default for VerificationStrategy {
    fn default() -> Self {
        VerificationStrategy::Jwks
    }
}

impl std::str::FromStr for VerificationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jwks" => Ok(VerificationStrategy::Jwks),
            "userinfo" => Ok(VerificationStrategy::Userinfo),
            _ => Err(format!("Invalid verification strategy: {}", s)),
        }
    }
}

/// 클레임 경로 매핑 설정
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimSettings {
    #[serde(default = "default_username_path")]
    pub username: String,
    #[serde(default = "default_email_path")]
    pub email: String,
    #[serde(default = "default_first_name_path")]
    pub first_name: String,
    #[serde(default = "default_last_name_path")]
    pub last_name: String,
    /// 역할을 읽을 클레임 경로 (순서대로 합집합)
    #[serde(default = "default_role_paths")]
    pub roles: Vec<String>,
    /// 최종 역할에서 제외할 역할
    #[serde(default)]
    pub role_ignore_list: Vec<String>,
    /// 사용자 이름을 역할로도 취급할지 여부
    #[serde(default = "default_true")]
    pub username_as_role: bool,
    /// `{filesystem_role_prefix}-{username}` 역할 추가 여부
    #[serde(default)]
    pub namespace_role: bool,
}

fn default_username_path() -> String { "preferred_username".to_string() }
fn default_email_path() -> String { "email".to_string() }
fn default_first_name_path() -> String { "given_name".to_string() }
fn default_last_name_path() -> String { "family_name".to_string() }
fn default_role_paths() -> Vec<String> {
    vec!["resource_access.anduin.roles".to_string(), "roles".to_string()]
}
fn default_true() -> bool { true }

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            username: default_username_path(),
            email: default_email_path(),
            first_name: default_first_name_path(),
            last_name: default_last_name_path(),
            roles: default_role_paths(),
            role_ignore_list: Vec::new(),
            username_as_role: true,
            namespace_role: false,
        }
    }
}

impl ClaimSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            username: env::var("OIDC_USERNAME_CLAIM_PATH").unwrap_or_else(|_| default_username_path()),
            email: env::var("OIDC_EMAIL_CLAIM_PATH").unwrap_or_else(|_| default_email_path()),
            first_name: env::var("OIDC_FIRST_NAME_CLAIM_PATH").unwrap_or_else(|_| default_first_name_path()),
            last_name: env::var("OIDC_LAST_NAME_CLAIM_PATH").unwrap_or_else(|_| default_last_name_path()),
            roles: parse_env_list("OIDC_ROLES_CLAIM_PATHS").unwrap_or_else(default_role_paths),
            role_ignore_list: parse_env_list("OIDC_ROLE_IGNORE_LIST").unwrap_or_default(),
            username_as_role: parse_env_var("OIDC_USERNAME_AS_ROLE", default_true)?,
            namespace_role: parse_env_var("OIDC_NAMESPACE_ROLE", || false)?,
        })
    }
}

/// IdP 연동 설정
#[derive(Debug, Clone, Deserialize)]
pub struct OidcSettings {
    /// IdP 기본 URL (예: `https://auth.example.org/realms/anduin`)
    #[serde(default)]
    pub base_url: Option<String>,

    /// JWKS URI. 없으면 `{base_url}/protocol/openid-connect/certs`
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// userinfo URI. 없으면 `{base_url}/protocol/openid-connect/userinfo`
    #[serde(default)]
    pub userinfo_uri: Option<String>,

    #[serde(default)]
    pub strategy: VerificationStrategy,

    /// 기대하는 audience. 지정하지 않으면 검사하지 않습니다.
    #[serde(default)]
    pub audience: Option<String>,

    #[serde(default = "default_userinfo_timeout_ms")]
    pub userinfo_timeout_ms: u64,

    /// 검증 결과 캐시 TTL
    #[serde(default = "default_token_cache_ttl_secs")]
    pub token_cache_ttl_secs: u64,

    /// 공개 키 세트 캐시 TTL
    #[serde(default = "default_jwks_ttl_secs")]
    pub jwks_ttl_secs: u64,

    /// 모르는 kid로 키 세트를 강제 재조회하는 최소 간격
    #[serde(default = "default_jwks_refresh_cooldown_secs")]
    pub jwks_refresh_cooldown_secs: u64,

    /// exp/nbf 허용 오차
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,

    #[serde(default)]
    pub claims: ClaimSettings,
}

fn default_userinfo_timeout_ms() -> u64 { 1000 }
fn default_token_cache_ttl_secs() -> u64 { 30 }
fn default_jwks_ttl_secs() -> u64 { 3600 }
fn default_jwks_refresh_cooldown_secs() -> u64 { 30 }
fn default_leeway_secs() -> u64 { 60 }

impl Default for OidcSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            jwks_uri: None,
            userinfo_uri: None,
            strategy: VerificationStrategy::default(),
            audience: None,
            userinfo_timeout_ms: default_userinfo_timeout_ms(),
            token_cache_ttl_secs: default_token_cache_ttl_secs(),
            jwks_ttl_secs: default_jwks_ttl_secs(),
            jwks_refresh_cooldown_secs: default_jwks_refresh_cooldown_secs(),
            leeway_secs: default_leeway_secs(),
            claims: ClaimSettings::default(),
        }
    }
}

impl OidcSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            base_url: env::var("OIDC_BASE_URL").ok(),
            jwks_uri: env::var("OIDC_JWKS_URI").ok(),
            userinfo_uri: env::var("OIDC_USERINFO_URI").ok(),
            strategy: parse_env_var("OIDC_VERIFICATION_STRATEGY", VerificationStrategy::default)?,
            audience: env::var("OIDC_AUDIENCE").ok(),
            userinfo_timeout_ms: parse_env_var("OIDC_USERINFO_TIMEOUT_MS", default_userinfo_timeout_ms)?,
            token_cache_ttl_secs: parse_env_var("OIDC_TOKEN_CACHE_TTL", default_token_cache_ttl_secs)?,
            jwks_ttl_secs: parse_env_var("OIDC_JWKS_TTL", default_jwks_ttl_secs)?,
            jwks_refresh_cooldown_secs: parse_env_var(
                "OIDC_JWKS_REFRESH_COOLDOWN",
                default_jwks_refresh_cooldown_secs,
            )?,
            leeway_secs: parse_env_var("OIDC_LEEWAY", default_leeway_secs)?,
            claims: ClaimSettings::from_env()?,
        })
    }

    pub fn jwks_uri(&self) -> Option<String> {
        self.jwks_uri.clone().or_else(|| {
            self.base_url.as_ref().map(|base| {
                format!("{}/protocol/openid-connect/certs", base.trim_end_matches('/'))
            })
        })
    }

    pub fn userinfo_uri(&self) -> Option<String> {
        self.userinfo_uri.clone().or_else(|| {
            self.base_url.as_ref().map(|base| {
                format!("{}/protocol/openid-connect/userinfo", base.trim_end_matches('/'))
            })
        })
    }

    pub fn userinfo_timeout(&self) -> Duration {
        Duration::from_millis(self.userinfo_timeout_ms)
    }

    pub fn token_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.token_cache_ttl_secs)
    }

    pub fn jwks_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_ttl_secs)
    }

    pub fn jwks_refresh_cooldown(&self) -> Duration {
        Duration::from_secs(self.jwks_refresh_cooldown_secs)
    }

    /// 인증이 켜져 있을 때 호출됩니다.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let jwks_uri = self.jwks_uri().ok_or_else(|| SettingsError::EnvVarMissing {
            var_name: "OIDC_BASE_URL".to_string(),
        })?;
        url::Url::parse(&jwks_uri).map_err(|e| SettingsError::EnvVarInvalid {
            var_name: "OIDC_JWKS_URI".to_string(),
            value: jwks_uri.clone(),
            reason: e.to_string(),
        })?;

        if self.strategy == VerificationStrategy::Userinfo && self.userinfo_uri().is_none() {
            return Err(SettingsError::EnvVarMissing {
                var_name: "OIDC_USERINFO_URI".to_string(),
            });
        }

        if self.token_cache_ttl_secs == 0 {
            return Err(SettingsError::InvalidConfig(
                "토큰 캐시 TTL은 0보다 커야 합니다".to_string(),
            ));
        }

        Ok(())
    }
}
