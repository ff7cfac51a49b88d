//! 탐색 비컨
//!
//! `"<hostname>|<port>"`를 주기적으로 UDP 브로드캐스트
//! - 송신 실패는 로그만 남기고 계속 (datagram은 원래 best-effort)
//! - 소켓 준비 실패는 호출자에게 시작 실패로 반환

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::encode_announcement;
use crate::{Config, Error, Result};

/// 준비된 비컨 (소켓 바인드 완료)
#[derive(Debug)]
pub struct Beacon {
    socket: UdpSocket,
    target: SocketAddr,
    payload: Bytes,
    interval: Duration,
}

impl Beacon {
    /// 브로드캐스트 소켓 준비
    pub async fn bind(config: &Config, hostname: &str, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(Error::BeaconStartup)?;
        socket.set_broadcast(true).map_err(Error::BeaconStartup)?;

        Ok(Self {
            socket,
            target: config.broadcast_target(),
            payload: Bytes::from(encode_announcement(hostname, port)),
            interval: config.broadcast_interval(),
        })
    }

    /// 취소될 때까지 송출
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "비컨 송출 시작: {:?} → {} (every {:?})",
            String::from_utf8_lossy(&self.payload),
            self.target,
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        let mut sent = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.socket.send_to(&self.payload, self.target).await {
                Ok(_) => sent += 1,
                Err(e) => warn!("비컨 송신 실패: {}", e),
            }
        }

        debug!("비컨 종료: {} datagrams", sent);
    }
}

/// 비컨 시작 추상화
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// 비컨을 준비해 백그라운드로 시작
    ///
    /// 준비 실패는 에러로 반환, 이후 실패는 태스크 안에서 처리
    async fn start(
        &self,
        hostname: &str,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>>;
}

/// UDP 비컨
#[derive(Debug, Clone)]
pub struct UdpBroadcaster {
    config: Config,
}

impl UdpBroadcaster {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Broadcaster for UdpBroadcaster {
    async fn start(
        &self,
        hostname: &str,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let beacon = Beacon::bind(&self.config, hostname, port).await?;
        Ok(tokio::spawn(beacon.run(cancel)))
    }
}
