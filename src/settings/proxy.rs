use std::collections::HashMap;
use std::env;
use std::time::Duration;
use serde::Deserialize;
use crate::proxy::DEFAULT_MAX_REWRITE_BYTES;
use super::{server::parse_env_var, SettingsError};

/// 프록시 및 응답 변환 설정
#[derive(Debug, Clone, Deserialize)]
pub struct ProxySettings {
    /// HTML 응답에 스니펫을 삽입할지 여부
    #[serde(default)]
    pub inject_html: bool,

    /// `</body>` 앞에 삽입할 마커
    #[serde(default = "default_injection_snippet")]
    pub injection_snippet: String,

    /// 재작성한 응답에서 content-security-policy 헤더를 제거할지 여부
    #[serde(default)]
    pub strip_csp: bool,

    /// 경로로 서비스를 찾지 못하면 Referer 경로로 다시 찾을지 여부
    #[serde(default = "default_true")]
    pub referer_fallback: bool,

    /// 재작성을 위해 버퍼링할 본문의 최대 크기 (바이트)
    #[serde(default = "default_max_rewrite_bytes")]
    pub max_rewrite_bytes: usize,

    /// 백엔드 요청 타임아웃
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// 경로별 고정 리다이렉트 (끝의 `/`는 무시)
    #[serde(default)]
    pub manual_redirects: HashMap<String, String>,
}

fn default_injection_snippet() -> String {
    r#"<script src="/js/anduin-menu-nav.js"></script>"#.to_string()
}
fn default_true() -> bool { true }
fn default_upstream_timeout_secs() -> u64 { 30 }
fn default_max_rewrite_bytes() -> usize { DEFAULT_MAX_REWRITE_BYTES }

/// `/from=/to,/other=https://example.org` 형식을 파싱합니다.
fn parse_redirects(value: Option<&str>) -> Result<HashMap<String, String>, SettingsError> {
    let mut redirects = HashMap::new();
    let Some(value) = value else {
        return Ok(redirects);
    };

    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (from, to) = entry.split_once('=').ok_or_else(|| SettingsError::EnvVarInvalid {
            var_name: "PROXY_MANUAL_REDIRECTS".to_string(),
            value: entry.to_string(),
            reason: "from=to 형식이어야 합니다".to_string(),
        })?;
        redirects.insert(from.trim().to_string(), to.trim().to_string());
    }

    Ok(redirects)
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            inject_html: false,
            injection_snippet: default_injection_snippet(),
            strip_csp: false,
            referer_fallback: true,
            max_rewrite_bytes: default_max_rewrite_bytes(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            manual_redirects: HashMap::new(),
        }
    }
}

impl ProxySettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            inject_html: parse_env_var("PROXY_ENABLED_NAV_BUTTON_INJECTION", || false)?,
            injection_snippet: env::var("PROXY_INJECTION_SNIPPET").unwrap_or_else(|_| default_injection_snippet()),
            strip_csp: parse_env_var("PROXY_STRIP_CSP", || false)?,
            referer_fallback: parse_env_var("PROXY_REFERER_FALLBACK", default_true)?,
            max_rewrite_bytes: parse_env_var("PROXY_MAX_REWRITE_BYTES", default_max_rewrite_bytes)?,
            upstream_timeout_secs: parse_env_var("PROXY_UPSTREAM_TIMEOUT", default_upstream_timeout_secs)?,
            manual_redirects: parse_redirects(env::var("PROXY_MANUAL_REDIRECTS").ok().as_deref())?,
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.inject_html && self.injection_snippet.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "HTML 삽입이 켜져 있지만 삽입할 스니펫이 비어 있습니다".to_string(),
            ));
        }
        if self.inject_html && self.max_rewrite_bytes == 0 {
            return Err(SettingsError::InvalidConfig(
                "재작성 본문 한도는 0보다 커야 합니다".to_string(),
            ));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(SettingsError::InvalidConfig(
                "백엔드 타임아웃은 0보다 커야 합니다".to_string(),
            ));
        }
        for from in self.manual_redirects.keys() {
            if !from.starts_with('/') {
                return Err(SettingsError::InvalidConfig(format!(
                    "리다이렉트 경로는 /로 시작해야 합니다: {}",
                    from
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_redirects() {
        let redirects = parse_redirects(Some("/docs=/superset/docs, /old=https://example.org/new")).unwrap();
        assert_eq!(redirects.len(), 2);
        assert_eq!(redirects["/docs"], "/superset/docs");
        assert_eq!(redirects["/old"], "https://example.org/new");

        assert!(parse_redirects(None).unwrap().is_empty());
        assert!(parse_redirects(Some("/broken")).is_err());
    }

    #[test]
    fn test_validate_rejects_relative_redirect_source() {
        let mut settings = ProxySettings::default();
        settings.manual_redirects.insert("docs".to_string(), "/superset".to_string());
        assert!(settings.validate().is_err());
    }
}
