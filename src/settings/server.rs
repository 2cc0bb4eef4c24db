use serde::Deserialize;
use std::env;
use super::SettingsError;

#[derive(Clone, Debug, Deserialize)]
pub struct ServerSettings {
    /// 바인딩 주소 (기본값: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP 포트 (기본값: 3000)
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// 게이트웨이 외부 URL (리다이렉트 및 x-forwarded-proto 판단용)
    #[serde(default = "default_app_url")]
    pub app_url: String,
}

fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_http_port() -> u16 { 3000 }
fn default_app_url() -> String { "http://localhost:4000".to_string() }

pub fn parse_env_var<T: std::str::FromStr, F: FnOnce() -> T>(name: &str, default: F) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val.parse().map_err(|e: T::Err| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: val,
            reason: e.to_string(),
        }),
        Err(env::VarError::NotPresent) => Ok(default()),
        Err(e) => Err(SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: "".to_string(),
            reason: e.to_string(),
        }),
    }
}

/// 쉼표로 구분된 환경 변수를 목록으로 읽습니다. 빈 항목은 버립니다.
pub fn parse_env_list(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|value| {
        value.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl ServerSettings {
    const MIN_PORT: u16 = 1;
    const MAX_PORT: u16 = 65535;

    /// 포트 값을 파싱합니다.
    ///
    /// 쿠버네티스 서비스 링크 형식(`tcp://10.0.0.1:3000`)도 허용하며, 이 경우 마지막 `:` 뒤의 값을 사용합니다.
    pub fn parse_port(name: &str, value: &str) -> Result<u16, SettingsError> {
        let raw = if value.starts_with("tcp:") {
            value.rsplit(':').next().unwrap_or(value)
        } else {
            value
        };

        let port = raw.parse::<u16>().map_err(|_| SettingsError::EnvVarInvalid {
            var_name: name.to_string(),
            value: value.to_string(),
            reason: format!("포트는 {}-{} 범위여야 합니다", Self::MIN_PORT, Self::MAX_PORT),
        })?;

        if port < Self::MIN_PORT {
            return Err(SettingsError::EnvVarInvalid {
                var_name: name.to_string(),
                value: value.to_string(),
                reason: "포트는 0이 될 수 없습니다".to_string(),
            });
        }

        Ok(port)
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        let http_port = match env::var("GATEWAY_PORT").or_else(|_| env::var("PORT")) {
            Ok(value) => Self::parse_port("GATEWAY_PORT", &value)?,
            Err(_) => default_http_port(),
        };

        let settings = Self {
            bind_address: env::var("GATEWAY_BIND_ADDRESS").unwrap_or_else(|_| default_bind_address()),
            http_port,
            app_url: env::var("GATEWAY_APP_URL").unwrap_or_else(|_| default_app_url()),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.http_port < Self::MIN_PORT {
            return Err(SettingsError::InvalidConfig("HTTP 포트는 0이 될 수 없습니다".to_string()));
        }

        url::Url::parse(&self.app_url).map_err(|e| SettingsError::EnvVarInvalid {
            var_name: "GATEWAY_APP_URL".to_string(),
            value: self.app_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(())
    }

    pub fn is_https(&self) -> bool {
        self.app_url.starts_with("https://")
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            app_url: default_app_url(),
        }
    }
}
