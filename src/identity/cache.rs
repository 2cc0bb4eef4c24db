use std::time::{Duration, Instant};
use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

/// 토큰 하나에 대한 검증 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub active: bool,
    /// 검증된 클레임 (활성 토큰일 때만)
    pub claims: Option<Value>,
    /// 비활성 사유
    pub error: Option<String>,
}

impl Verification {
    pub fn active(claims: Value) -> Self {
        Self {
            active: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn inactive(reason: impl Into<String>) -> Self {
        Self {
            active: false,
            claims: None,
            error: Some(reason.into()),
        }
    }
}

struct CachedVerification {
    verification: Verification,
    cached_at: Instant,
}

/// 토큰별 검증 결과 캐시
///
/// 성공과 확정적인 실패만 저장하며, 만료된 항목은 조회 시점에 제거됩니다.
pub struct VerificationCache {
    entries: DashMap<String, CachedVerification>,
    ttl: Duration,
}

impl VerificationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// 만료되지 않은 결과의 복사본을 반환합니다.
    pub fn get(&self, token: &str) -> Option<Verification> {
        let entry = self.entries.get(token)?;
        if entry.cached_at.elapsed() < self.ttl {
            return Some(entry.verification.clone());
        }

        drop(entry);
        self.entries.remove(token);
        None
    }

    pub fn insert(&self, token: &str, verification: Verification) {
        self.entries.insert(
            token.to_string(),
            CachedVerification {
                verification,
                cached_at: Instant::now(),
            },
        );
    }

    /// 만료된 항목을 모두 제거하고 제거된 개수를 반환합니다.
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        let evicted = before.saturating_sub(self.entries.len());
        if evicted > 0 {
            debug!(evicted = evicted, remaining = self.entries.len(), "만료된 검증 결과 정리");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
