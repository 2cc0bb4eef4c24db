use std::env;
use serde::Deserialize;
use super::{server::{parse_env_list, parse_env_var}, SettingsError};

/// 서비스 헤더에 실을 역할을 계산하는 방식
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RoleMappingKind {
    /// 허용 역할과 겹치는 역할만 유지
    AllowedIntersection,
    /// `{prefix}-X` 역할을 `X`로 변환하고 admin은 유지
    FilesystemNamespace,
}

impl Default for RoleMappingKind {
    fn default() -> Self {
        RoleMappingKind::AllowedIntersection
    }
}

/// 백엔드 서비스 하나의 설정
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// 백엔드 기본 URL (`http://dagster:3000`)
    pub url: String,

    /// 게이트웨이 경로 접두사 (`/dagster`)
    pub path_prefix: String,

    #[serde(default)]
    pub allowed_roles: Vec<String>,

    #[serde(default = "default_true")]
    pub auth_required: bool,

    /// 서비스 내부 로그아웃 경로 (접두사 기준 상대 경로)
    #[serde(default)]
    pub logout_path: Option<String>,

    /// 백엔드로 보낼 때 접두사를 제거할지 여부
    #[serde(default)]
    pub strip_path_prefix: bool,

    #[serde(default)]
    pub role_mapping: RoleMappingKind,
}

fn default_true() -> bool { true }

impl ServiceSettings {
    /// 기본 서비스 목록을 환경 변수로 덮어써서 만듭니다.
    ///
    /// 순서는 dagster, cask, superset이며 `{NAME}_ENABLED=false`인 서비스는 제외됩니다.
    pub fn defaults_from_env(admin_role: &str) -> Result<Vec<Self>, SettingsError> {
        let defaults = [
            Self {
                name: "dagster".to_string(),
                enabled: true,
                url: "http://dagster:3000".to_string(),
                path_prefix: "/dagster".to_string(),
                allowed_roles: vec![
                    env::var("GATEWAY_EXECUTE_ROLE").unwrap_or_else(|_| "execute".to_string()),
                    admin_role.to_string(),
                ],
                auth_required: true,
                logout_path: None,
                strip_path_prefix: false,
                role_mapping: RoleMappingKind::AllowedIntersection,
            },
            Self {
                name: "cask".to_string(),
                enabled: true,
                url: "http://cask:3001".to_string(),
                path_prefix: "/cask".to_string(),
                allowed_roles: Vec::new(),
                auth_required: false,
                logout_path: None,
                strip_path_prefix: false,
                role_mapping: RoleMappingKind::FilesystemNamespace,
            },
            Self {
                name: "superset".to_string(),
                enabled: true,
                url: "http://superset:8088".to_string(),
                path_prefix: "/superset".to_string(),
                allowed_roles: vec![
                    env::var("GATEWAY_DASHBOARD_ROLE").unwrap_or_else(|_| "dashboard".to_string()),
                    env::var("GATEWAY_DASHBOARD_ADMIN_ROLE").unwrap_or_else(|_| "dashboard-admin".to_string()),
                    admin_role.to_string(),
                ],
                auth_required: true,
                logout_path: Some(env::var("SUPERSET_LOGOUT_PATH").unwrap_or_else(|_| "/logout".to_string())),
                strip_path_prefix: false,
                role_mapping: RoleMappingKind::AllowedIntersection,
            },
        ];

        let mut services = Vec::new();
        for mut service in defaults {
            let key = service.name.to_uppercase();
            service.enabled = parse_env_var(&format!("{}_ENABLED", key), || true)?;
            if let Ok(url) = env::var(format!("{}_URL", key)) {
                service.url = url;
            }
            if let Ok(prefix) = env::var(format!("{}_PATH_PREFIX", key)) {
                service.path_prefix = prefix;
            }
            if let Some(roles) = parse_env_list(&format!("{}_ALLOWED_ROLES", key)) {
                service.allowed_roles = roles;
            }
            if service.enabled {
                services.push(service);
            }
        }

        Ok(services)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let url = url::Url::parse(&self.url).map_err(|e| SettingsError::EnvVarInvalid {
            var_name: format!("{}_URL", self.name.to_uppercase()),
            value: self.url.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" {
            return Err(SettingsError::InvalidConfig(format!(
                "서비스 {}의 백엔드는 http만 지원합니다: {}",
                self.name, self.url
            )));
        }

        if !self.path_prefix.starts_with('/') || self.path_prefix.len() < 2 {
            return Err(SettingsError::InvalidConfig(format!(
                "서비스 {}의 경로 접두사가 올바르지 않습니다: {}",
                self.name, self.path_prefix
            )));
        }

        if self.path_prefix.ends_with('/') {
            return Err(SettingsError::InvalidConfig(format!(
                "서비스 {}의 경로 접두사는 /로 끝날 수 없습니다: {}",
                self.name, self.path_prefix
            )));
        }

        if self.auth_required && self.allowed_roles.is_empty() {
            return Err(SettingsError::InvalidConfig(format!(
                "서비스 {}는 인증이 필요하지만 허용 역할이 없습니다",
                self.name
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_service_env() {
        for name in ["DAGSTER", "CASK", "SUPERSET"] {
            for suffix in ["ENABLED", "URL", "PATH_PREFIX", "ALLOWED_ROLES"] {
                env::remove_var(format!("{}_{}", name, suffix));
            }
        }
        env::remove_var("SUPERSET_LOGOUT_PATH");
    }

    #[test]
    #[serial]
    fn test_default_services_order() {
        clear_service_env();
        let services = ServiceSettings::defaults_from_env("admin").unwrap();
        let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["dagster", "cask", "superset"]);
        assert_eq!(services[1].role_mapping, RoleMappingKind::FilesystemNamespace);
        assert_eq!(services[2].logout_path.as_deref(), Some("/logout"));
        for service in &services {
            assert!(service.validate().is_ok());
        }
    }

    #[test]
    #[serial]
    fn test_service_env_overrides() {
        clear_service_env();
        env::set_var("CASK_ENABLED", "false");
        env::set_var("SUPERSET_URL", "http://127.0.0.1:9000");
        env::set_var("SUPERSET_PATH_PREFIX", "/dashboards");

        let services = ServiceSettings::defaults_from_env("admin").unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[1].url, "http://127.0.0.1:9000");
        assert_eq!(services[1].path_prefix, "/dashboards");

        clear_service_env();
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let service = ServiceSettings {
            name: "broken".to_string(),
            enabled: true,
            url: "http://broken:80".to_string(),
            path_prefix: "broken/".to_string(),
            allowed_roles: vec!["admin".to_string()],
            auth_required: true,
            logout_path: None,
            strip_path_prefix: false,
            role_mapping: RoleMappingKind::AllowedIntersection,
        };
        assert!(service.validate().is_err());
    }
}
