use std::io::{self, Read};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};

/// 재작성 시 해제할 수 있는 응답 인코딩
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Zstd,
}

impl ContentEncoding {
    /// `content-encoding` 헤더 값을 해석합니다. 지원하지 않거나 여러 겹이면 `None`.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        let Some(value) = value else {
            return Some(ContentEncoding::Identity);
        };

        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Some(ContentEncoding::Identity),
            "gzip" | "x-gzip" => Some(ContentEncoding::Gzip),
            "deflate" => Some(ContentEncoding::Deflate),
            "zstd" => Some(ContentEncoding::Zstd),
            _ => None,
        }
    }

    /// 본문을 해제합니다. 결과가 `limit` 바이트를 넘으면 에러입니다.
    pub fn decode(self, body: &[u8], limit: usize) -> io::Result<Vec<u8>> {
        match self {
            ContentEncoding::Identity => read_all(body, limit),
            ContentEncoding::Gzip => read_all(GzDecoder::new(body), limit),
            ContentEncoding::Deflate => {
                // zlib 래핑이 표준이지만 raw deflate를 보내는 서버도 있음
                read_all(ZlibDecoder::new(body), limit).or_else(|_| read_all(DeflateDecoder::new(body), limit))
            }
            ContentEncoding::Zstd => read_all(zstd::stream::read::Decoder::new(body)?, limit),
        }
    }
}

fn read_all<R: Read>(reader: R, limit: usize) -> io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    reader.take(cap).read_to_end(&mut decoded)?;
    if decoded.len() > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("해제한 본문이 {}바이트를 넘음", limit),
        ));
    }
    Ok(decoded)
}
