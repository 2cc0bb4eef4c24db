use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("세션 저장소 오류: {0}")]
    Backend(String),
}

/// 세션 저장소 trait
///
/// 게이트웨이는 세션 ID로 IdP 토큰을 조회하고, 만료된 세션을 파기하는 용도로만 사용합니다.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 세션 값을 조회합니다. 없거나 만료되었으면 `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// 세션 값을 TTL과 함께 저장합니다.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), SessionError>;

    /// 세션을 파기합니다.
    async fn destroy(&self, key: &str) -> Result<(), SessionError>;
}

#[derive(Debug)]
struct SessionEntry {
    value: String,
    expires_at: Instant,
}

/// 메모리 기반 세션 저장소
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<DashMap<String, SessionEntry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 만료된 세션을 정리하고 제거된 개수를 반환합니다.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.value.clone()));
            }
            drop(entry);
            self.entries.remove(key);
            debug!(session = %key, "만료된 세션 제거");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), SessionError> {
        self.entries.insert(
            key.to_string(),
            SessionEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn destroy(&self, key: &str) -> Result<(), SessionError> {
        self.entries.remove(key);
        Ok(())
    }
}
