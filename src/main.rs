use std::sync::Arc;
use auth_gateway::{
    logging::init_logging,
    server::ServerManager,
    session::MemorySessionStore,
    settings::Settings,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match Settings::load().await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("설정 로드 실패: {}", e);
            return Err(e.into());
        }
    };

    // 파일 로깅일 때 버퍼를 비우려면 가드를 끝까지 유지해야 함
    let _log_guard = init_logging(&settings.logging);
    info!(
        http_port = settings.server.http_port,
        https = settings.tls.enabled,
        auth = settings.auth.enabled,
        "게이트웨이 시작"
    );

    let sessions = Arc::new(MemorySessionStore::new());
    let manager = ServerManager::new(settings, sessions).await.map_err(|e| {
        error!(error = %e, "서버 초기화 실패");
        e
    })?;

    if let Err(e) = manager.run().await {
        error!(error = %e, "서버 실행 중 에러 발생");
        return Err(e.into());
    }

    Ok(())
}
