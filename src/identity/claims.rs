use std::collections::BTreeSet;
use serde_json::Value;
use tracing::warn;
use crate::settings::ClaimSettings;
use super::Identity;

/// 점으로 구분된 클레임 경로 (`resource_access.anduin.roles`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimPath {
    segments: Vec<String>,
}

impl ClaimPath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// 경로를 따라 값을 찾습니다. 중간에 객체가 아니거나 키가 없으면 `None`.
    ///
    /// 배열을 만나면 숫자 세그먼트를 인덱스로 해석합니다.
    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        if self.segments.is_empty() {
            return None;
        }

        let mut current = root;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        match current {
            Value::Null => None,
            value => Some(value),
        }
    }

    /// 스칼라 값을 문자열로 읽습니다.
    pub fn resolve_string(&self, root: &Value) -> Option<String> {
        match self.resolve(root)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// 스칼라 또는 배열 값을 문자열 목록으로 읽습니다.
    pub fn resolve_strings(&self, root: &Value) -> Vec<String> {
        match self.resolve(root) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// 검증된 클레임을 `Identity`로 변환
#[derive(Debug, Clone)]
pub struct ClaimMapper {
    username: ClaimPath,
    email: ClaimPath,
    first_name: ClaimPath,
    last_name: ClaimPath,
    roles: Vec<ClaimPath>,
    role_ignore_list: Vec<String>,
    username_as_role: bool,
    namespace_role_prefix: Option<String>,
}

impl ClaimMapper {
    pub fn new(settings: &ClaimSettings, filesystem_role_prefix: &str) -> Self {
        Self {
            username: ClaimPath::parse(&settings.username),
            email: ClaimPath::parse(&settings.email),
            first_name: ClaimPath::parse(&settings.first_name),
            last_name: ClaimPath::parse(&settings.last_name),
            roles: settings.roles.iter().map(|p| ClaimPath::parse(p)).collect(),
            role_ignore_list: settings.role_ignore_list.clone(),
            username_as_role: settings.username_as_role,
            namespace_role_prefix: settings
                .namespace_role
                .then(|| filesystem_role_prefix.to_string()),
        }
    }

    /// 클레임이 객체가 아니면 경고를 남기고 `None`을 반환합니다.
    pub fn map(&self, claims: &Value) -> Option<Identity> {
        if !claims.is_object() {
            warn!(claims_type = %json_type(claims), "클레임이 객체가 아니므로 신원을 만들 수 없음");
            return None;
        }

        let preferred_username = claims
            .get("preferred_username")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let username = self
            .username
            .resolve_string(claims)
            .or_else(|| preferred_username.clone());

        let mut roles: BTreeSet<String> = self
            .roles
            .iter()
            .flat_map(|path| path.resolve_strings(claims))
            .filter(|role| !role.is_empty())
            .collect();

        if self.username_as_role {
            roles.extend(username.iter().cloned());
            roles.extend(preferred_username.iter().cloned());
        }

        if let (Some(prefix), Some(name)) = (&self.namespace_role_prefix, &username) {
            roles.insert(format!("{}-{}", prefix, name));
        }

        roles.retain(|role| !self.role_ignore_list.contains(role));

        Some(Identity {
            username,
            email: self.email.resolve_string(claims),
            first_name: self.first_name.resolve_string(claims),
            last_name: self.last_name.resolve_string(claims),
            roles,
        })
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper(settings: ClaimSettings) -> ClaimMapper {
        ClaimMapper::new(&settings, "caskfs")
    }

    #[test]
    fn test_claim_path_resolution() {
        let claims = json!({
            "resource_access": { "anduin": { "roles": ["admin", "execute"] } },
            "groups": [{ "name": "first" }],
            "nothing": null
        });

        assert_eq!(
            ClaimPath::parse("resource_access.anduin.roles").resolve_strings(&claims),
            vec!["admin", "execute"]
        );
        assert_eq!(
            ClaimPath::parse("groups.0.name").resolve_string(&claims).as_deref(),
            Some("first")
        );
        assert!(ClaimPath::parse("resource_access.other.roles").resolve(&claims).is_none());
        assert!(ClaimPath::parse("nothing").resolve(&claims).is_none());
        assert!(ClaimPath::parse("").resolve(&claims).is_none());
    }

    #[test]
    fn test_roles_union_and_dedup() {
        let claims = json!({
            "preferred_username": "alice",
            "email": "alice@example.org",
            "given_name": "Alice",
            "resource_access": { "anduin": { "roles": ["execute", "admin"] } },
            "roles": "admin"
        });

        let identity = mapper(ClaimSettings::default()).map(&claims).unwrap();
        assert_eq!(identity.username.as_deref(), Some("alice"));
        assert_eq!(identity.first_name.as_deref(), Some("Alice"));
        assert_eq!(identity.last_name, None);
        let roles: Vec<_> = identity.roles.iter().map(String::as_str).collect();
        assert_eq!(roles, vec!["admin", "alice", "execute"]);
    }

    #[test]
    fn test_username_falls_back_to_preferred_username() {
        let settings = ClaimSettings {
            username: "upn".to_string(),
            username_as_role: false,
            ..Default::default()
        };
        let identity = mapper(settings)
            .map(&json!({ "preferred_username": "bob" }))
            .unwrap();
        assert_eq!(identity.username.as_deref(), Some("bob"));
        assert!(identity.roles.is_empty());
    }

    #[test]
    fn test_namespace_role_and_ignore_list() {
        let settings = ClaimSettings {
            namespace_role: true,
            role_ignore_list: vec!["offline_access".to_string(), "carol".to_string()],
            ..Default::default()
        };
        let identity = mapper(settings)
            .map(&json!({ "preferred_username": "carol", "roles": ["offline_access", "viewer"] }))
            .unwrap();
        assert!(identity.roles.contains("caskfs-carol"));
        assert!(identity.roles.contains("viewer"));
        assert!(!identity.roles.contains("offline_access"));
        assert!(!identity.roles.contains("carol"));
    }

    #[test]
    fn test_non_object_claims_yield_no_identity() {
        let mapper = mapper(ClaimSettings::default());
        assert!(mapper.map(&json!("not-an-object")).is_none());
        assert!(mapper.map(&json!([1, 2, 3])).is_none());
    }
}
