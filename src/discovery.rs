//! 탐색 리스너
//!
//! 잘 알려진 UDP 포트에서 `"hostname|port"` 비컨을 받아 `Host`로 변환
//! - 호스트 스트림과 에러 스트림 두 개로 비동기 발행
//! - 읽기 데드라인은 취소 확인용, 만료는 에러가 아님
//! - 취소되면 소켓을 닫고 두 스트림 모두 종료

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::registry::Host;
use crate::{Config, Error, Result, ANNOUNCEMENT_SEPARATOR};

/// 비컨 페이로드 생성
pub fn encode_announcement(hostname: &str, port: u16) -> String {
    format!("{}{}{}", hostname, ANNOUNCEMENT_SEPARATOR, port)
}

/// 비컨 페이로드 + 송신 주소 → `Host`
///
/// 포트는 마지막 구분자 뒤 10진수
pub fn parse_announcement(payload: &[u8], source: IpAddr) -> Result<Host> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| Error::MalformedAnnouncement(String::from_utf8_lossy(payload).into_owned()))?;
    let text = text.trim_end_matches(['\0', '\n', '\r']);

    let (name, port) = text
        .rsplit_once(ANNOUNCEMENT_SEPARATOR)
        .ok_or_else(|| Error::MalformedAnnouncement(text.to_string()))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| Error::InvalidPort {
            raw: port.to_string(),
        })?;

    Ok(Host::new(name, source, port))
}

/// 탐색 결과 스트림
pub struct Discovery {
    /// 발견된 호스트 (중복 포함, 중복 제거는 레지스트리 담당)
    pub hosts: mpsc::Receiver<Host>,

    /// 치명적이지 않은 에러 (잘못된 페이로드, 일시적 읽기 실패)
    pub errors: mpsc::Receiver<Error>,
}

/// 탐색기 추상화
#[async_trait]
pub trait Discoverer: Send + Sync {
    /// 취소될 때까지 탐색, 취소되면 두 스트림이 닫힘
    async fn discover(&self, cancel: CancellationToken) -> Discovery;
}

/// UDP 브로드캐스트 탐색기
#[derive(Debug, Clone)]
pub struct UdpDiscoverer {
    config: Config,
}

impl UdpDiscoverer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Discoverer for UdpDiscoverer {
    async fn discover(&self, cancel: CancellationToken) -> Discovery {
        match DiscoveryListener::bind(&self.config).await {
            Ok(listener) => listener.spawn(cancel).0,
            Err(e) => {
                // 바인드 실패도 에러 스트림으로 보내고 종료
                let (_hosts_tx, hosts) = mpsc::channel(1);
                let (errors_tx, errors) = mpsc::channel(1);
                let _ = errors_tx.try_send(e);
                Discovery { hosts, errors }
            }
        }
    }
}

/// 바인드된 탐색 소켓
pub struct DiscoveryListener {
    socket: UdpSocket,
    read_timeout: Duration,
    capacity: usize,
}

impl DiscoveryListener {
    pub async fn bind(config: &Config) -> Result<Self> {
        let addr = config.discovery_bind();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;

        Ok(Self {
            socket,
            read_timeout: config.discovery_read_timeout(),
            capacity: config.discovery_channel_capacity.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 수신 태스크 시작
    pub fn spawn(self, cancel: CancellationToken) -> (Discovery, JoinHandle<()>) {
        let (hosts_tx, hosts) = mpsc::channel(self.capacity);
        let (errors_tx, errors) = mpsc::channel(self.capacity);

        let task = tokio::spawn(self.run(cancel, hosts_tx, errors_tx));
        (Discovery { hosts, errors }, task)
    }

    async fn run(
        self,
        cancel: CancellationToken,
        hosts_tx: mpsc::Sender<Host>,
        errors_tx: mpsc::Sender<Error>,
    ) {
        info!(
            "탐색 리스너 시작: {}",
            self.socket
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        );
        let mut buf = vec![0u8; 1024];

        loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                r = tokio::time::timeout(self.read_timeout, self.socket.recv_from(&mut buf)) => r,
            };

            let result = match received {
                // 데드라인 만료: 취소 여부만 다시 확인
                Err(_elapsed) => continue,
                Ok(Err(e)) => Err(Error::Io(e)),
                Ok(Ok((len, source))) => parse_announcement(&buf[..len], source.ip()),
            };

            let delivered = match result {
                Ok(host) => {
                    debug!("비컨 수신: {}", host);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        r = hosts_tx.send(host) => r.is_ok(),
                    }
                }
                Err(e) => {
                    debug!("비컨 처리 에러: {}", e);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        r = errors_tx.send(e) => r.is_ok(),
                    }
                }
            };

            if !delivered {
                debug!("탐색 결과 수신측 종료");
                break;
            }
        }

        info!("탐색 리스너 종료");
        // socket, hosts_tx, errors_tx drop → 소켓 닫힘, 스트림 종료
    }
}
