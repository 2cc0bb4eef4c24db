use bytes::{Bytes, BytesMut};
use futures_util::{future, stream, StreamExt};
use http_body_util::{BodyExt, BodyStream, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{self, HeaderValue};
use hyper::http::response::Parts;
use hyper::{Response, StatusCode};
use tracing::{debug, warn};
use crate::settings::ProxySettings;
use super::{encoding::ContentEncoding, full, headers::remove_hop_by_hop, GatewayBody, ProxyError};

/// 재작성을 위해 버퍼링하는 본문의 기본 최대 크기 (압축 해제 후 기준 포함)
pub const DEFAULT_MAX_REWRITE_BYTES: usize = 8 * 1024 * 1024;

/// 응답 변환 단계
enum Stage<B> {
    /// 상태, 헤더, 본문을 그대로 스트리밍
    Passthrough(Response<GatewayBody>),
    /// 재작성 대상 본문을 모으는 중
    Buffering(Parts, B),
    /// 디코딩 후 마커 삽입
    Rewriting(Parts, Bytes),
    /// 완성된 본문으로 응답 구성
    Flushing(Parts, Bytes),
}

/// HTML 응답에 스니펫을 삽입하는 변환기
#[derive(Debug, Clone)]
pub struct ResponseTransformer {
    inject: bool,
    snippet: String,
    strip_csp: bool,
    max_body_bytes: usize,
}

impl ResponseTransformer {
    pub fn new(inject: bool, snippet: impl Into<String>, strip_csp: bool) -> Self {
        Self {
            inject,
            snippet: snippet.into(),
            strip_csp,
            max_body_bytes: DEFAULT_MAX_REWRITE_BYTES,
        }
    }

    /// 버퍼링 한도. 넘는 본문은 재작성하지 않고 그대로 스트리밍합니다.
    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn from_settings(settings: &ProxySettings) -> Self {
        Self::new(settings.inject_html, settings.injection_snippet.clone(), settings.strip_csp)
            .with_max_body_bytes(settings.max_rewrite_bytes)
    }

    /// 주입이 켜져 있고 content-type이 `text/html`이면 재작성 대상입니다.
    pub fn is_candidate(&self, parts: &Parts) -> bool {
        let has_body = !(parts.status.is_informational()
            || parts.status == StatusCode::NO_CONTENT
            || parts.status == StatusCode::NOT_MODIFIED);

        self.inject
            && has_body
            && !self.snippet.is_empty()
            && parts
                .headers
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim_start().to_ascii_lowercase().starts_with("text/html"))
                .unwrap_or(false)
    }

    pub async fn transform<B>(&self, response: Response<B>) -> Result<Response<GatewayBody>, ProxyError>
    where
        B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + Unpin + 'static,
    {
        let (parts, body) = response.into_parts();
        let mut stage = if self.is_candidate(&parts) && !self.exceeds_limit(&parts) {
            Stage::Buffering(parts, body)
        } else {
            Stage::Passthrough(Response::from_parts(parts, body.boxed()))
        };

        loop {
            stage = match stage {
                Stage::Passthrough(response) => {
                    let (mut parts, body) = response.into_parts();
                    remove_hop_by_hop(&mut parts.headers, false);
                    return Ok(Response::from_parts(parts, body));
                }
                Stage::Buffering(parts, mut body) => {
                    let mut buffered = BytesMut::new();
                    loop {
                        let Some(frame) = body.frame().await else {
                            break Stage::Rewriting(parts, buffered.freeze());
                        };
                        let Ok(data) = frame?.into_data() else {
                            continue;
                        };
                        buffered.extend_from_slice(&data);
                        if buffered.len() > self.max_body_bytes {
                            warn!(limit = self.max_body_bytes, "응답 본문이 재작성 한도를 넘어 그대로 전달");
                            break Stage::Passthrough(Response::from_parts(parts, resume(buffered.freeze(), body)));
                        }
                    }
                }
                Stage::Rewriting(mut parts, original) => {
                    let encoding = parts
                        .headers
                        .get(header::CONTENT_ENCODING)
                        .and_then(|value| value.to_str().ok());

                    let decoded = match ContentEncoding::parse(encoding) {
                        Some(encoding) => encoding
                            .decode(&original, self.max_body_bytes)
                            .map_err(|e| e.to_string()),
                        None => Err(format!("지원하지 않는 인코딩: {:?}", encoding)),
                    };

                    match decoded {
                        Ok(decoded) => {
                            let body = self.inject_marker(decoded);
                            parts.headers.remove(header::CONTENT_ENCODING);
                            if self.strip_csp {
                                parts.headers.remove(header::CONTENT_SECURITY_POLICY);
                            }
                            Stage::Flushing(parts, Bytes::from(body))
                        }
                        Err(reason) => {
                            warn!(reason = %reason, "응답 본문 디코딩 실패, 원본 그대로 전달");
                            Stage::Flushing(parts, original)
                        }
                    }
                }
                Stage::Flushing(mut parts, body) => {
                    remove_hop_by_hop(&mut parts.headers, false);
                    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
                    return Ok(Response::from_parts(parts, full(body)));
                }
            };
        }
    }

    fn exceeds_limit(&self, parts: &Parts) -> bool {
        parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok())
            .is_some_and(|length| length > self.max_body_bytes)
    }

    /// 첫 `</body>` 앞에, 없으면 `</html>` 앞에, 둘 다 없으면 끝에 삽입합니다.
    /// 이미 스니펫이 있으면 그대로 둡니다.
    pub fn inject_marker(&self, mut html: Vec<u8>) -> Vec<u8> {
        let snippet = self.snippet.as_bytes();
        if find(&html, snippet).is_some() {
            debug!("스니펫이 이미 있어 삽입하지 않음");
            return html;
        }

        let position = find(&html, b"</body>")
            .or_else(|| find(&html, b"</html>"))
            .unwrap_or(html.len());
        html.splice(position..position, snippet.iter().copied());
        html
    }
}

/// 이미 읽은 앞부분에 남은 본문을 이어 붙입니다.
fn resume<B>(head: Bytes, rest: B) -> GatewayBody
where
    B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    let head = stream::once(future::ready(Ok::<_, hyper::Error>(Frame::data(head))));
    BodyExt::boxed(StreamBody::new(head.chain(BodyStream::new(rest))))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use flate2::{write::GzEncoder, Compression};
    use std::convert::Infallible;
    use http_body_util::Full;

    const SNIPPET: &str = r#"<script src="/js/anduin-menu-nav.js"></script>"#;

    fn transformer() -> ResponseTransformer {
        ResponseTransformer::new(true, SNIPPET, false)
    }

    fn response(content_type: &str, encoding: Option<&str>, body: Vec<u8>) -> Response<GatewayBody> {
        let mut builder = Response::builder()
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, body.len())
            .header(header::CONTENT_SECURITY_POLICY, "default-src 'self'");
        if let Some(encoding) = encoding {
            builder = builder.header(header::CONTENT_ENCODING, encoding);
        }
        builder.body(full(body)).unwrap()
    }

    async fn body_of(response: Response<GatewayBody>) -> Vec<u8> {
        response.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    #[test]
    fn test_inject_marker_positions() {
        let t = transformer();
        let html = t.inject_marker(b"<html><body>x</body></html>".to_vec());
        assert_eq!(
            String::from_utf8(html).unwrap(),
            format!("<html><body>x{}</body></html>", SNIPPET)
        );

        let no_body = t.inject_marker(b"<html>x</html>".to_vec());
        assert_eq!(String::from_utf8(no_body).unwrap(), format!("<html>x{}</html>", SNIPPET));

        let fragment = t.inject_marker(b"<p>x</p>".to_vec());
        assert_eq!(String::from_utf8(fragment).unwrap(), format!("<p>x</p>{}", SNIPPET));
    }

    #[test]
    fn test_inject_marker_is_case_sensitive_and_first_only() {
        let t = transformer();
        let html = t.inject_marker(b"<BODY>a</BODY><body>b</body><body>c</body>".to_vec());
        assert_eq!(
            String::from_utf8(html).unwrap(),
            format!("<BODY>a</BODY><body>b{}</body><body>c</body>", SNIPPET)
        );
    }

    #[test]
    fn test_second_pass_does_not_inject_twice() {
        let t = transformer();
        let once = t.inject_marker(b"<html><body></body></html>".to_vec());
        let twice = t.inject_marker(once.clone());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_gzip_html_is_rewritten() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"<html><body>hi</body></html>").unwrap();
        let compressed = encoder.finish().unwrap();

        let result = transformer()
            .transform(response("text/html; charset=utf-8", Some("gzip"), compressed))
            .await
            .unwrap();

        assert!(result.headers().get(header::CONTENT_ENCODING).is_none());
        assert!(result.headers().get(header::CONTENT_SECURITY_POLICY).is_some());
        let length: usize = result.headers()[header::CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
        let body = body_of(result).await;
        assert_eq!(body.len(), length);
        assert_eq!(
            String::from_utf8(body).unwrap(),
            format!("<html><body>hi{}</body></html>", SNIPPET)
        );
    }

    #[tokio::test]
    async fn test_csp_stripped_when_configured() {
        let t = ResponseTransformer::new(true, SNIPPET, true);
        let result = t
            .transform(response("text/html", None, b"<body></body>".to_vec()))
            .await
            .unwrap();
        assert!(result.headers().get(header::CONTENT_SECURITY_POLICY).is_none());
    }

    #[tokio::test]
    async fn test_corrupt_encoding_serves_original() {
        let original = b"not really gzip".to_vec();
        let result = transformer()
            .transform(response("text/html", Some("gzip"), original.clone()))
            .await
            .unwrap();
        assert_eq!(result.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(body_of(result).await, original);

        let brotli = transformer()
            .transform(response("text/html", Some("br"), original.clone()))
            .await
            .unwrap();
        assert_eq!(body_of(brotli).await, original);
    }

    #[tokio::test]
    async fn test_non_html_passes_through() {
        let body = b"{\"ok\":true}".to_vec();
        let result = transformer()
            .transform(response("application/json", None, body.clone()))
            .await
            .unwrap();
        assert_eq!(body_of(result).await, body);

        let disabled = ResponseTransformer::new(false, SNIPPET, false);
        let html = b"<body></body>".to_vec();
        let result = disabled
            .transform(response("text/html", None, html.clone()))
            .await
            .unwrap();
        assert_eq!(body_of(result).await, html);
    }

    #[tokio::test]
    async fn test_body_over_limit_streams_unchanged() {
        let html = format!("<html><body>{}</body></html>", "a".repeat(256)).into_bytes();
        let t = transformer().with_max_body_bytes(64);

        let result = t.transform(response("text/html", None, html.clone())).await.unwrap();
        assert_eq!(body_of(result).await, html);

        // content-length 없이 청크로 오는 본문
        let chunks = html.chunks(50).map(|c| Ok::<_, hyper::Error>(Frame::data(Bytes::copy_from_slice(c))));
        let streamed = BodyExt::boxed(StreamBody::new(stream::iter(chunks.collect::<Vec<_>>())));
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "text/html")
            .body(streamed)
            .unwrap();
        let result = t.transform(response).await.unwrap();
        assert_eq!(body_of(result).await, html);
    }

    #[tokio::test]
    async fn test_decompressed_body_over_limit_serves_original() {
        let html = format!("<html><body>{}</body></html>", "a".repeat(4096));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(html.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();
        assert!(compressed.len() < 1024);

        let result = transformer()
            .with_max_body_bytes(1024)
            .transform(response("text/html", Some("gzip"), compressed.clone()))
            .await
            .unwrap();
        assert_eq!(result.headers()[header::CONTENT_ENCODING], "gzip");
        assert_eq!(body_of(result).await, compressed);
    }

    #[tokio::test]
    async fn test_not_modified_is_not_rewritten() {
        let response = Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::CONTENT_TYPE, "text/html")
            .body(full(Bytes::new()))
            .unwrap();
        let result = transformer().transform(response).await.unwrap();
        assert_eq!(result.status(), StatusCode::NOT_MODIFIED);
        assert!(body_of(result).await.is_empty());
    }

    #[tokio::test]
    async fn test_plain_full_body_type() {
        let response = Response::builder()
            .header(header::CONTENT_TYPE, "text/html")
            .body(Full::new(Bytes::from_static(b"<body></body>")).map_err(|never: Infallible| -> hyper::Error { match never {} }))
            .unwrap();
        let result = transformer().transform(response).await.unwrap();
        assert!(String::from_utf8(body_of(result).await).unwrap().contains(SNIPPET));
    }
}
