use std::{env, fs, path::Path};
use serde::Deserialize;
use tracing::{debug, info};

mod server;
pub mod logging;
mod tls;
mod error;
mod auth;
mod oidc;
mod proxy;
mod services;

pub use server::ServerSettings;
pub use logging::LogSettings;
pub use tls::TlsSettings;
pub use auth::AuthSettings;
pub use oidc::{ClaimSettings, OidcSettings, VerificationStrategy};
pub use proxy::ProxySettings;
pub use services::{RoleMappingKind, ServiceSettings};
pub use error::SettingsError;

pub type Result<T> = std::result::Result<T, SettingsError>;
pub use server::{parse_env_list, parse_env_var};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // 서버 설정
    #[serde(default)]
    pub server: ServerSettings,

    // 로깅 설정
    #[serde(default)]
    pub logging: LogSettings,

    // TLS 설정
    #[serde(default)]
    pub tls: TlsSettings,

    /// 헤더 정리 및 접근 정책
    #[serde(default)]
    pub auth: AuthSettings,

    /// IdP 연동
    #[serde(default)]
    pub oidc: OidcSettings,

    /// 프록시 및 HTML 재작성
    #[serde(default)]
    pub proxy: ProxySettings,

    /// 백엔드 서비스 (등록 순서대로 매칭)
    #[serde(default)]
    pub services: Vec<ServiceSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            logging: LogSettings::default(),
            tls: TlsSettings::default(),
            auth: AuthSettings::default(),
            oidc: OidcSettings::default(),
            proxy: ProxySettings::default(),
            services: Vec::new(),
        }
    }
}

impl Settings {
    pub async fn load() -> Result<Self> {
        if let Ok(config_path) = env::var("GATEWAY_CONFIG_FILE") {
            Self::from_toml_file(&config_path).await
        } else {
            Self::from_env().await
        }
    }

    pub async fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!("설정 파일 로드: {}", path.as_ref().display());
        let content = fs::read_to_string(&path).map_err(|e| SettingsError::FileError {
            path: path.as_ref().to_string_lossy().to_string(),
            error: e,
        })?;

        let settings: Self = toml::from_str(&content)
            .map_err(|e| SettingsError::ParseError { source: e })?;

        settings.validate().await?;
        info!(
            services = settings.services.len(),
            "설정 파일 로드 완료: {}",
            path.as_ref().display()
        );
        Ok(settings)
    }

    pub async fn from_env() -> Result<Self> {
        let auth = AuthSettings::from_env()?;
        let services = ServiceSettings::defaults_from_env(&auth.admin_role)?;

        let settings = Self {
            server: ServerSettings::from_env()?,
            logging: LogSettings::from_env()?,
            tls: TlsSettings::from_env()?,
            auth,
            oidc: OidcSettings::from_env()?,
            proxy: ProxySettings::from_env()?,
            services,
        };

        // 설정 생성 시점에 바로 검증
        settings.validate().await?;
        Ok(settings)
    }

    /// 설정 유효성 검증
    pub async fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.tls.validate().await?;
        self.auth.validate()?;
        self.proxy.validate()?;

        if self.auth.enabled {
            self.oidc.validate()?;
        }

        for (index, service) in self.services.iter().enumerate() {
            service.validate()?;
            let duplicate = self.services[..index]
                .iter()
                .any(|other| other.name == service.name || other.path_prefix == service.path_prefix);
            if duplicate {
                return Err(SettingsError::InvalidConfig(format!(
                    "중복된 서비스 이름 또는 경로 접두사: {} ({})",
                    service.name, service.path_prefix
                )));
            }
        }

        Ok(())
    }

    /// 활성화된 서비스만 등록 순서대로 반환
    pub fn enabled_services(&self) -> impl Iterator<Item = &ServiceSettings> {
        self.services.iter().filter(|s| s.enabled)
    }
}
