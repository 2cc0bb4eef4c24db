use crate::routing::RoutingError;

/// 경로 접두사 매처
///
/// 접두사 뒤에는 `/` 또는 문자열 끝이 와야 합니다. `/superset`은 `/supersetx`와 매칭되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    pub fn new(prefix: &str) -> Result<Self, RoutingError> {
        if !prefix.starts_with('/') {
            return Err(RoutingError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "/로 시작해야 합니다".to_string(),
            });
        }

        let trimmed = prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(RoutingError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "루트 경로는 서비스 접두사로 사용할 수 없습니다".to_string(),
            });
        }

        Ok(Self {
            prefix: trimmed.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches(&self, path: &str) -> bool {
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// 접두사를 제외한 서비스 기준 경로. 매칭되지 않으면 경로를 그대로 반환합니다.
    pub fn relative<'a>(&self, path: &'a str) -> &'a str {
        if !self.matches(path) {
            return path;
        }
        match &path[self.prefix.len()..] {
            "" => "/",
            rest => rest,
        }
    }
}
