use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::rustls::{self, Certificate, PrivateKey};
use tokio_rustls::TlsAcceptor;
use tracing::{error, info};
use crate::settings::TlsSettings;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("TLS 인증서 또는 키 경로가 설정되지 않음")]
    MissingPath,

    #[error("{path} 읽기 실패: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}에서 개인키를 찾을 수 없음")]
    NoPrivateKey(String),

    #[error("TLS 설정 실패: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("HTTPS 포트 바인딩 실패: {0}")]
    Bind(#[source] std::io::Error),
}

pub struct TlsConfig {
    pub acceptor: TlsAcceptor,
    pub listener: TcpListener,
}

impl TlsConfig {
    pub async fn from_settings(settings: &TlsSettings, bind_address: &str) -> Result<Self, TlsError> {
        let (Some(cert_path), Some(key_path)) = (&settings.cert_path, &settings.key_path) else {
            return Err(TlsError::MissingPath);
        };
        Self::new(cert_path, key_path, &format!("{}:{}", bind_address, settings.port)).await
    }

    pub async fn new(cert_path: &Path, key_path: &Path, addr: &str) -> Result<Self, TlsError> {
        let tls_config = Self::load_tls_config(cert_path, key_path)?;
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(error = %e, addr = %addr, "HTTPS 포트 바인딩 실패");
            TlsError::Bind(e)
        })?;

        info!(addr = %addr, "HTTPS 리스너 시작");
        Ok(Self { acceptor, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<rustls::ServerConfig, TlsError> {
        let read_error = |path: &Path| {
            let path = path.display().to_string();
            move |source: std::io::Error| TlsError::Read { path, source }
        };

        let cert_file = File::open(cert_path).map_err(read_error(cert_path))?;
        let mut cert_reader = BufReader::new(cert_file);
        let certs = rustls_pemfile::certs(&mut cert_reader)
            .map_err(read_error(cert_path))?
            .into_iter()
            .map(Certificate)
            .collect();

        let key_file = File::open(key_path).map_err(read_error(key_path))?;
        let mut key_reader = BufReader::new(key_file);
        let key = rustls_pemfile::pkcs8_private_keys(&mut key_reader)
            .map_err(read_error(key_path))?
            .into_iter()
            .next()
            .ok_or_else(|| TlsError::NoPrivateKey(key_path.display().to_string()))?;

        let config = rustls::ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(certs, PrivateKey(key))?;

        Ok(config)
    }
}
