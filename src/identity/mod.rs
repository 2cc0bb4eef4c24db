//! 요청의 자격 증명을 검증하고 게이트웨이 공통 `Identity`로 변환합니다.

mod cache;
mod claims;
mod error;
mod inflight;
mod jwks;
mod verifier;

pub use cache::{Verification, VerificationCache};
pub use claims::{ClaimMapper, ClaimPath};
pub use error::IdentityError;
pub use inflight::InFlight;
pub use jwks::JwksCache;
pub use verifier::{build_verifier, LocalVerifier, TokenVerifier, UserinfoVerifier};

use std::collections::BTreeSet;
use std::sync::Arc;
use hyper::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::session::SessionStore;

/// 검증된 사용자 신원
///
/// 필드 순서와 정렬된 역할 덕분에 같은 신원은 항상 같은 JSON으로 직렬화됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub roles: BTreeSet<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn to_header_value(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 요청에서 추출한 자격 증명
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// 세션 쿠키로 찾은 토큰
    Session { session_id: String, token: String },
    /// `Authorization: Bearer` 토큰
    Bearer(String),
}

impl Credential {
    pub fn token(&self) -> &str {
        match self {
            Credential::Session { token, .. } => token,
            Credential::Bearer(token) => token,
        }
    }
}

type VerifyOutcome = Result<Verification, IdentityError>;

pub struct IdentityResolver {
    verifier: Arc<dyn TokenVerifier>,
    cache: Arc<VerificationCache>,
    in_flight: InFlight<VerifyOutcome>,
    mapper: ClaimMapper,
    sessions: Arc<dyn SessionStore>,
    session_cookie: String,
}

impl IdentityResolver {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        cache: Arc<VerificationCache>,
        mapper: ClaimMapper,
        sessions: Arc<dyn SessionStore>,
        session_cookie: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            cache,
            in_flight: InFlight::new(),
            mapper,
            sessions,
            session_cookie: session_cookie.into(),
        }
    }

    pub fn cache(&self) -> &Arc<VerificationCache> {
        &self.cache
    }

    /// 요청의 신원을 확인합니다. 자격 증명이 없거나 유효하지 않으면 `None`.
    ///
    /// `attached`는 앞 단계에서 이미 요청에 붙인 신원이며, 있으면 다시 검증하지 않습니다.
    pub async fn resolve(&self, headers: &HeaderMap, attached: Option<&Identity>) -> Option<Identity> {
        if let Some(identity) = attached {
            return Some(identity.clone());
        }

        let credential = self.extract_credential(headers).await?;
        let verification = match self.verify(credential.token()).await {
            Ok(verification) => verification,
            Err(e) => {
                warn!(error = %e, "토큰 검증 불가, 인증되지 않은 요청으로 처리");
                return None;
            }
        };

        if !verification.active {
            debug!(reason = ?verification.error, "비활성 토큰");
            if let Credential::Session { session_id, .. } = &credential {
                if let Err(e) = self.sessions.destroy(session_id).await {
                    warn!(error = %e, "만료된 세션 파기 실패");
                }
            }
            return None;
        }

        self.mapper.map(verification.claims.as_ref()?)
    }

    /// 세션 쿠키를 먼저 확인하고, 없으면 Bearer 토큰을 사용합니다.
    pub async fn extract_credential(&self, headers: &HeaderMap) -> Option<Credential> {
        if let Some(session_id) = find_cookie(headers, &self.session_cookie) {
            match self.sessions.get(&session_id).await {
                Ok(Some(token)) if !token.is_empty() => {
                    return Some(Credential::Session { session_id, token });
                }
                Ok(_) => debug!("세션에 토큰이 없음"),
                Err(e) => warn!(error = %e, "세션 조회 실패"),
            }
        }

        bearer_token(headers).map(Credential::Bearer)
    }

    /// 캐시를 확인하고, 없으면 검증기를 호출합니다.
    ///
    /// 같은 토큰에 대한 동시 호출은 한 번의 검증을 공유합니다.
    pub async fn verify(&self, token: &str) -> VerifyOutcome {
        if let Some(cached) = self.cache.get(token) {
            return Ok(cached);
        }

        let verifier = self.verifier.clone();
        let cache = self.cache.clone();
        let owned_token = token.to_string();
        self.in_flight
            .run(token, async move {
                let outcome = verifier.verify(&owned_token).await;
                if let Ok(verification) = &outcome {
                    cache.insert(&owned_token, verification.clone());
                }
                outcome
            })
            .await
    }
}

fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
