use std::collections::BTreeSet;
use crate::identity::Identity;
use crate::routing::{PrefixMatcher, RoutingError};
use crate::settings::{RoleMappingKind, ServiceSettings};

/// 서비스 헤더에 실을 역할 계산 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleMapping {
    /// 서비스 허용 역할과 겹치는 역할
    AllowedIntersection,
    /// `{prefix}-X` 역할은 `X`로, admin은 그대로
    FilesystemNamespace { prefix: String, admin_role: String },
}

impl RoleMapping {
    /// 신원에서 서비스 전용 역할을 계산합니다.
    pub fn derive(&self, identity: &Identity, allowed_roles: &[String]) -> BTreeSet<String> {
        match self {
            RoleMapping::AllowedIntersection => identity
                .roles
                .iter()
                .filter(|role| allowed_roles.iter().any(|a| a.eq_ignore_ascii_case(role)))
                .cloned()
                .collect(),
            RoleMapping::FilesystemNamespace { prefix, admin_role } => {
                let namespace = format!("{}-", prefix);
                identity
                    .roles
                    .iter()
                    .filter_map(|role| {
                        if role == admin_role {
                            Some(role.clone())
                        } else {
                            role.strip_prefix(namespace.as_str())
                                .filter(|name| !name.is_empty())
                                .map(str::to_string)
                        }
                    })
                    .collect()
            }
        }
    }
}

/// 등록된 백엔드 서비스
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    /// 끝의 `/`를 제거한 백엔드 기본 URL
    pub backend_url: String,
    pub matcher: PrefixMatcher,
    pub auth_required: bool,
    pub allowed_roles: Vec<String>,
    pub logout_path: Option<String>,
    pub strip_path_prefix: bool,
    pub role_mapping: RoleMapping,
}

impl ServiceDescriptor {
    pub fn from_settings(
        settings: &ServiceSettings,
        filesystem_role_prefix: &str,
        admin_role: &str,
    ) -> Result<Self, RoutingError> {
        let url = url::Url::parse(&settings.url).map_err(|e| RoutingError::InvalidBackendUrl {
            url: settings.url.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" {
            return Err(RoutingError::InvalidBackendUrl {
                url: settings.url.clone(),
                reason: "http 백엔드만 지원합니다".to_string(),
            });
        }

        let role_mapping = match settings.role_mapping {
            RoleMappingKind::AllowedIntersection => RoleMapping::AllowedIntersection,
            RoleMappingKind::FilesystemNamespace => RoleMapping::FilesystemNamespace {
                prefix: filesystem_role_prefix.to_string(),
                admin_role: admin_role.to_string(),
            },
        };

        Ok(Self {
            name: settings.name.clone(),
            backend_url: settings.url.trim_end_matches('/').to_string(),
            matcher: PrefixMatcher::new(&settings.path_prefix)?,
            auth_required: settings.auth_required,
            allowed_roles: settings.allowed_roles.clone(),
            logout_path: settings.logout_path.clone(),
            strip_path_prefix: settings.strip_path_prefix,
            role_mapping,
        })
    }

    pub fn path_prefix(&self) -> &str {
        self.matcher.prefix()
    }

    /// 신원 역할과 서비스 전용 역할의 합집합
    pub fn header_roles(&self, identity: &Identity) -> BTreeSet<String> {
        let mut roles = identity.roles.clone();
        roles.extend(self.role_mapping.derive(identity, &self.allowed_roles));
        roles
    }
}
