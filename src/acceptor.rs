//! 연결 수락기 (서버측)
//!
//! - 리스너 포트와 호스트 이름으로 비컨 시작
//! - 연결마다 독립 태스크로 수신자 실행, 세마포어로 동시 연결 수 제한
//! - 종료 토큰이 취소되거나 리스너가 닫히면 수락을 멈추고
//!   진행 중인 수신자가 모두 끝난 뒤에 반환

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::beacon::Broadcaster;
use crate::stats::TransferStats;
use crate::transport::Listener;
use crate::{Config, Error, Result};

/// 호스트 이름 조회 실패 시 비컨에 싣는 이름
pub const UNKNOWN_HOSTNAME: &str = "unknown host";

/// 수락 에러 후 재시도 대기
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// 연결 처리기
#[async_trait]
pub trait ConnectionHandler<C>: Send + Sync + 'static {
    async fn handle(&self, conn: C, peer: SocketAddr) -> Result<TransferStats>;
}

/// 로컬 호스트 이름
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOSTNAME.to_string())
}

/// 연결 수락기
pub struct Acceptor<L, H, B> {
    listener: L,
    handler: Arc<H>,
    broadcaster: B,
    config: Config,
    hostname: Option<String>,
}

impl<L, H, B> Acceptor<L, H, B>
where
    L: Listener,
    H: ConnectionHandler<L::Conn>,
    B: Broadcaster,
{
    pub fn new(listener: L, handler: H, broadcaster: B, config: Config) -> Self {
        Self {
            listener,
            handler: Arc::new(handler),
            broadcaster,
            config,
            hostname: None,
        }
    }

    /// 비컨에 실을 이름 고정 (기본은 OS 호스트 이름)
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// 수락 루프
    ///
    /// `shutdown` 취소 또는 리스너 닫힘은 정상 종료. 비컨도 같은 범위에서 멈춤
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        let port = self.listener.local_addr()?.port();
        let hostname = self.hostname.take().unwrap_or_else(local_hostname);

        let beacon_cancel = shutdown.child_token();
        let beacon = self
            .broadcaster
            .start(&hostname, port, beacon_cancel.clone())
            .await?;

        info!("수신 대기: {} (port {})", hostname, port);

        let permits = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        let mut workers = JoinSet::new();

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                p = permits.clone().acquire_owned() => p.map_err(|_| Error::ChannelError)?,
            };

            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                r = self.listener.accept() => r,
            };

            match accepted {
                Ok(Some((conn, peer))) => {
                    debug!("연결 수락: {}", peer);
                    let handler = self.handler.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = handler.handle(conn, peer).await {
                            warn!(%peer, "수신 실패: {}", e);
                        }
                    });
                }
                Ok(None) => {
                    info!("리스너 닫힘");
                    break;
                }
                Err(e) => {
                    warn!("연결 수락 실패: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }

            // 끝난 작업 정리
            while let Some(done) = workers.try_join_next() {
                if let Err(e) = done {
                    warn!("수신 태스크 비정상 종료: {}", e);
                }
            }
        }

        beacon_cancel.cancel();

        let in_flight = workers.len();
        if in_flight > 0 {
            info!("진행 중인 수신 {}개 대기", in_flight);
        }
        while let Some(done) = workers.join_next().await {
            if let Err(e) = done {
                warn!("수신 태스크 비정상 종료: {}", e);
            }
        }

        if let Err(e) = beacon.await {
            warn!("비컨 태스크 비정상 종료: {}", e);
        }

        info!("수락기 종료");
        Ok(())
    }
}
