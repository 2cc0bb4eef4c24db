use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use hyper_util::rt::TokioIo;
use crate::{
    proxy::ConnectionInfo,
    settings::Settings,
    tls::TlsConfig,
};
use tracing::{debug, error, info};
use super::handler::RequestHandler;
use super::Result;

pub struct ServerListener {
    http_listener: TcpListener,
    https_config: Option<TlsConfig>,
}

impl ServerListener {
    pub async fn new(settings: &Settings) -> Result<Self> {
        let addr = format!("{}:{}", settings.server.bind_address, settings.server.http_port);
        let https_config = if settings.tls.enabled {
            Some(TlsConfig::from_settings(&settings.tls, &settings.server.bind_address).await?)
        } else {
            None
        };

        Self::bind(&addr, https_config).await
    }

    pub async fn bind(addr: &str, https_config: Option<TlsConfig>) -> Result<Self> {
        let http_listener = TcpListener::bind(addr).await.map_err(|e| {
            error!(error = %e, addr = %addr, "HTTP 포트 바인딩 실패");
            e
        })?;

        info!(addr = %addr, "HTTP 리스너 시작");
        Ok(Self {
            http_listener,
            https_config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.http_listener.local_addr()
    }

    pub async fn run(self, handler: Arc<RequestHandler>) -> Result<()> {
        loop {
            tokio::select! {
                result = self.http_listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            debug!(client = %remote_addr, "HTTP 연결 수락");
                            let handler = handler.clone();
                            let info = ConnectionInfo { remote_addr, tls: false };
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                if let Err(err) = handler.handle_connection(io, info).await {
                                    debug!(error = %err, client = %remote_addr, "HTTP 연결 처리 실패");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "HTTP 연결 수락 실패");
                        }
                    }
                }

                result = async {
                    if let Some(config) = &self.https_config {
                        config.listener.accept().await.map(|accepted| (accepted, config.acceptor.clone()))
                    } else {
                        std::future::pending().await
                    }
                } => {
                    match result {
                        Ok(((stream, remote_addr), acceptor)) => {
                            let handler = handler.clone();
                            let info = ConnectionInfo { remote_addr, tls: true };

                            tokio::spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(tls_stream) => {
                                        let io = TokioIo::new(tls_stream);
                                        if let Err(err) = handler.handle_connection(io, info).await {
                                            debug!(error = %err, client = %remote_addr, "HTTPS 연결 처리 실패");
                                        }
                                    }
                                    Err(e) => {
                                        error!(error = %e, client = %remote_addr, "TLS 핸드쉐이크 실패");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "HTTPS 연결 수락 실패");
                        }
                    }
                }
            }
        }
    }
}
