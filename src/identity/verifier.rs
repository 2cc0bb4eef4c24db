use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, Header, Validation};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};
use crate::settings::{OidcSettings, VerificationStrategy};
use super::{IdentityError, JwksCache, Verification};

/// 토큰 검증기 trait
///
/// 확정적인 실패(서명 불일치, 만료 등)는 `Ok(Verification::inactive)`로,
/// 다시 시도하면 달라질 수 있는 실패는 `Err`로 반환합니다.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Verification, IdentityError>;
}

/// 공개 키 세트로 서명을 직접 검증
pub struct LocalVerifier {
    jwks: Arc<JwksCache>,
    jwks_uri: String,
    audience: Option<String>,
    leeway: u64,
}

impl LocalVerifier {
    pub fn new(jwks: Arc<JwksCache>, jwks_uri: impl Into<String>) -> Self {
        Self {
            jwks,
            jwks_uri: jwks_uri.into(),
            audience: None,
            leeway: 60,
        }
    }

    pub fn with_audience(mut self, audience: Option<String>) -> Self {
        self.audience = audience;
        self
    }

    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    fn build_validation(&self, header: &Header) -> Option<Validation> {
        let alg = match header.alg {
            alg @ (Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384
            | Algorithm::EdDSA) => alg,
            // 대칭 키 알고리즘은 공개 키 세트로 검증할 수 없음
            _ => return None,
        };

        let mut validation = Validation::new(alg);
        validation.leeway = self.leeway;
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        Some(validation)
    }
}

#[async_trait]
impl TokenVerifier for LocalVerifier {
    async fn verify(&self, token: &str) -> Result<Verification, IdentityError> {
        let header = match jsonwebtoken::decode_header(token) {
            Ok(header) => header,
            Err(e) => return Ok(Verification::inactive(format!("토큰 헤더 오류: {}", e))),
        };

        let Some(validation) = self.build_validation(&header) else {
            return Ok(Verification::inactive(format!("지원하지 않는 알고리즘: {:?}", header.alg)));
        };

        let Some(kid) = header.kid.as_deref() else {
            return Ok(Verification::inactive("토큰 헤더에 kid가 없음"));
        };

        let Some(key) = self.jwks.find_decoding_key(&self.jwks_uri, kid).await? else {
            return Ok(Verification::inactive(format!("알 수 없는 kid: {}", kid)));
        };

        match jsonwebtoken::decode::<Value>(token, &key, &validation) {
            Ok(data) => Ok(Verification::active(data.claims)),
            Err(e) => {
                debug!(error = %e, "토큰 서명 검증 실패");
                Ok(Verification::inactive(e.to_string()))
            }
        }
    }
}

/// userinfo 엔드포인트로 검증하고, 시간 초과나 통신 실패 시 로컬 검증으로 대체
pub struct UserinfoVerifier {
    http: reqwest::Client,
    userinfo_uri: String,
    timeout: Duration,
    fallback: Arc<dyn TokenVerifier>,
}

impl UserinfoVerifier {
    pub fn new(
        http: reqwest::Client,
        userinfo_uri: impl Into<String>,
        timeout: Duration,
        fallback: Arc<dyn TokenVerifier>,
    ) -> Self {
        Self {
            http,
            userinfo_uri: userinfo_uri.into(),
            timeout,
            fallback,
        }
    }

    async fn query(&self, token: &str) -> Result<Verification, IdentityError> {
        let request = self.http.get(&self.userinfo_uri).bearer_auth(token).send();
        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| IdentityError::Timeout(self.timeout.as_millis() as u64))??;

        match response.status() {
            StatusCode::OK => match response.json::<Value>().await {
                Ok(claims) => Ok(Verification::active(claims)),
                Err(e) => Ok(Verification::inactive(format!("userinfo 응답 파싱 실패: {}", e))),
            },
            status => Ok(Verification::inactive(format!("userinfo 응답 상태 {}", status))),
        }
    }
}

#[async_trait]
impl TokenVerifier for UserinfoVerifier {
    async fn verify(&self, token: &str) -> Result<Verification, IdentityError> {
        match self.query(token).await {
            Ok(verification) => Ok(verification),
            Err(e) => {
                warn!(error = %e, "userinfo 검증 실패, 로컬 검증으로 대체");
                self.fallback.verify(token).await
            }
        }
    }
}

/// 설정된 전략에 맞는 검증기를 만듭니다.
pub fn build_verifier(settings: &OidcSettings) -> Result<Arc<dyn TokenVerifier>, IdentityError> {
    let jwks_uri = settings
        .jwks_uri()
        .ok_or_else(|| IdentityError::Misconfigured("OIDC_BASE_URL".to_string()))?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let local: Arc<dyn TokenVerifier> = Arc::new(
        LocalVerifier::new(
            Arc::new(
                JwksCache::with_client(http.clone(), settings.jwks_ttl())
                    .with_refresh_cooldown(settings.jwks_refresh_cooldown()),
            ),
            jwks_uri,
        )
        .with_audience(settings.audience.clone())
        .with_leeway(settings.leeway_secs),
    );

    match settings.strategy {
        VerificationStrategy::Jwks => Ok(local),
        VerificationStrategy::Userinfo => {
            let userinfo_uri = settings
                .userinfo_uri()
                .ok_or_else(|| IdentityError::Misconfigured("OIDC_USERINFO_URI".to_string()))?;
            Ok(Arc::new(UserinfoVerifier::new(
                http,
                userinfo_uri,
                settings.userinfo_timeout(),
                local,
            )))
        }
    }
}
