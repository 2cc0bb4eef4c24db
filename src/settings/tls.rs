use std::{env, path::PathBuf};
use serde::Deserialize;
use tokio::fs;
use super::{server::parse_env_var, SettingsError};

#[derive(Debug, Clone, Deserialize)]
pub struct TlsSettings {
    /// HTTPS 활성화 여부
    #[serde(default)]
    pub enabled: bool,

    /// HTTPS 포트
    #[serde(default = "default_https_port")]
    pub port: u16,

    /// 인증서 파일 경로
    pub cert_path: Option<PathBuf>,

    /// 개인키 파일 경로
    pub key_path: Option<PathBuf>,
}

impl TlsSettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Ok(Self {
            enabled: parse_env_var("GATEWAY_TLS_ENABLED", || false)?,
            port: parse_env_var("GATEWAY_TLS_PORT", default_https_port)?,
            cert_path: env::var("GATEWAY_TLS_CERT")
                .map(PathBuf::from)
                .ok(),
            key_path: env::var("GATEWAY_TLS_KEY")
                .map(PathBuf::from)
                .ok(),
        })
    }

    /// TLS 설정이 유효한지 검증
    pub async fn validate(&self) -> Result<(), SettingsError> {
        if !self.enabled {
            return Ok(());
        }

        let cert_path = self.cert_path.as_ref().ok_or_else(|| SettingsError::EnvVarMissing {
            var_name: "GATEWAY_TLS_CERT".to_string(),
        })?;

        let key_path = self.key_path.as_ref().ok_or_else(|| SettingsError::EnvVarMissing {
            var_name: "GATEWAY_TLS_KEY".to_string(),
        })?;

        // 읽을 수 있는지까지 확인
        for path in [cert_path, key_path] {
            fs::read(path).await.map_err(|e| SettingsError::FileError {
                path: path.to_string_lossy().to_string(),
                error: e,
            })?;
        }

        Ok(())
    }
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_https_port(),
            cert_path: None,
            key_path: None,
        }
    }
}

fn default_https_port() -> u16 {
    443
}
