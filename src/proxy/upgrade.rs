use hyper::upgrade::OnUpgrade;
use hyper::Response;
use hyper_util::rt::TokioIo;
use tracing::{debug, error};

/// 백엔드의 101 응답을 받은 뒤 클라이언트와 백엔드의 업그레이드된 연결을 양방향으로 잇습니다.
///
/// 응답 헤더는 손대지 않고 그대로 클라이언트에 전달되어야 합니다.
pub fn bridge<B>(client_upgrade: OnUpgrade, upstream_response: &mut Response<B>, target: String) {
    let upstream_upgrade = hyper::upgrade::on(upstream_response);
    tokio::spawn(async move {
        let (client, upstream) = match tokio::try_join!(client_upgrade, upstream_upgrade) {
            Ok(upgraded) => upgraded,
            Err(e) => {
                error!(upstream = %target, error = %e, "업그레이드 연결 수립 실패");
                return;
            }
        };

        let mut client = TokioIo::new(client);
        let mut upstream = TokioIo::new(upstream);
        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((to_upstream, to_client)) => debug!(
                upstream = %target,
                to_upstream = to_upstream,
                to_client = to_client,
                "업그레이드 연결 종료"
            ),
            Err(e) => debug!(upstream = %target, error = %e, "업그레이드 연결 중단"),
        }
    });
}
