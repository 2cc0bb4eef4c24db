use std::time::{Duration, Instant};
use dashmap::{mapref::entry::Entry, DashMap};
use jsonwebtoken::{jwk::JwkSet, DecodingKey};
use tracing::{debug, warn};
use super::IdentityError;

struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

/// JWKS URI별 공개 키 세트 캐시 (기본 1시간)
///
/// 모르는 `kid`로 인한 강제 재조회는 URI마다 `refresh_cooldown`에 한 번으로 제한됩니다.
pub struct JwksCache {
    inner: DashMap<String, CachedJwks>,
    forced_refreshes: DashMap<String, Instant>,
    http: reqwest::Client,
    ttl: Duration,
    refresh_cooldown: Duration,
}

impl JwksCache {
    pub fn new(ttl: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self::with_client(http, ttl)
    }

    pub fn with_client(http: reqwest::Client, ttl: Duration) -> Self {
        Self {
            inner: DashMap::new(),
            forced_refreshes: DashMap::new(),
            http,
            ttl,
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
        }
    }

    pub fn with_refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// 캐시된 키 세트를 반환하거나, 오래되었으면 다시 가져옵니다.
    ///
    /// `force_refresh`면 TTL과 무관하게 다시 가져옵니다.
    pub async fn get_or_fetch(&self, jwks_uri: &str, force_refresh: bool) -> Result<JwkSet, IdentityError> {
        if !force_refresh {
            if let Some(cached) = self.inner.get(jwks_uri) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!(jwks_uri = %jwks_uri, force_refresh = force_refresh, "공개 키 세트 조회");
        let response = self
            .http
            .get(jwks_uri)
            .send()
            .await
            .map_err(|e| IdentityError::KeySetUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IdentityError::KeySetUnavailable(format!(
                "{} 응답 상태 {}",
                jwks_uri,
                response.status()
            )));
        }

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| IdentityError::KeySetUnavailable(e.to_string()))?;

        self.inner.insert(
            jwks_uri.to_string(),
            CachedJwks {
                keys: keys.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(keys)
    }

    /// `kid`에 해당하는 키를 찾고, 없으면 한 번만 새로 가져와 다시 찾습니다.
    ///
    /// 최근에 강제 재조회를 했다면 다시 가져오지 않고 `None`을 반환합니다.
    pub async fn find_decoding_key(&self, jwks_uri: &str, kid: &str) -> Result<Option<DecodingKey>, IdentityError> {
        let keys = self.get_or_fetch(jwks_uri, false).await?;
        if let Some(key) = find_key_in_jwks(&keys, kid) {
            return Ok(Some(key));
        }

        if !self.claim_forced_refresh(jwks_uri) {
            debug!(kid = %kid, "최근에 키 세트를 다시 조회했으므로 재조회 생략");
            return Ok(None);
        }

        debug!(kid = %kid, "캐시된 키 세트에 kid가 없어 다시 조회");
        let keys = self.get_or_fetch(jwks_uri, true).await?;
        Ok(find_key_in_jwks(&keys, kid))
    }

    /// 쿨다운이 지났으면 강제 재조회 시각을 기록하고 참을 반환합니다.
    fn claim_forced_refresh(&self, jwks_uri: &str) -> bool {
        let now = Instant::now();
        match self.forced_refreshes.entry(jwks_uri.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.refresh_cooldown {
                    return false;
                }
                entry.insert(now);
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }
}

fn find_key_in_jwks(keys: &JwkSet, kid: &str) -> Option<DecodingKey> {
    let jwk = keys.find(kid)?;
    match DecodingKey::from_jwk(jwk) {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(kid = %kid, error = %e, "JWK를 복호화 키로 변환할 수 없음");
            None
        }
    }
}
