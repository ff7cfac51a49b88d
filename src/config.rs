//! 전송/탐색 설정

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    DEFAULT_BROADCAST_INTERVAL_MS, DEFAULT_BUFFER_SIZE, DEFAULT_DISCOVERY_PORT,
    DEFAULT_DISCOVERY_READ_TIMEOUT_MS, DEFAULT_MAX_PATH_LEN,
};

/// Beam 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 탐색용 UDP 포트 (비컨 목적지 + 리스너 바인드)
    pub discovery_port: u16,

    /// 비컨 목적지 주소
    /// 기본값은 제한 브로드캐스트 255.255.255.255
    pub broadcast_addr: IpAddr,

    /// 탐색 리스너 바인드 주소
    pub discovery_bind_addr: IpAddr,

    /// 비컨 송출 간격 (밀리초)
    pub broadcast_interval_ms: u64,

    /// 탐색 소켓 읽기 데드라인 (밀리초)
    /// 트래픽이 없어도 취소 여부를 다시 확인하기 위한 값, 만료는 에러가 아님
    pub discovery_read_timeout_ms: u64,

    /// 탐색 결과 채널 용량
    pub discovery_channel_capacity: usize,

    /// 스트림 버퍼 크기 (바이트)
    pub buffer_size: usize,

    /// 동시 수신 연결 최대 수
    pub max_connections: usize,

    /// 프레임 경로 최대 길이 (바이트)
    pub max_path_len: usize,

    /// 전송 루트의 무시 규칙 파일 이름
    pub ignore_file_name: String,

    /// 진행 이벤트 채널 용량
    pub progress_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_port: DEFAULT_DISCOVERY_PORT,
            broadcast_addr: IpAddr::V4(Ipv4Addr::BROADCAST),
            discovery_bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_interval_ms: DEFAULT_BROADCAST_INTERVAL_MS, // 1초
            discovery_read_timeout_ms: DEFAULT_DISCOVERY_READ_TIMEOUT_MS, // 3초
            discovery_channel_capacity: 5,
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_connections: 64,
            max_path_len: DEFAULT_MAX_PATH_LEN,
            ignore_file_name: ".gitignore".to_string(),
            progress_channel_capacity: 256,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 루프백 테스트용 설정
    ///
    /// 비컨은 127.0.0.1로, 포트는 OS가 할당, 간격은 짧게
    pub fn local_test() -> Self {
        Self {
            discovery_port: 0,
            broadcast_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            discovery_bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            broadcast_interval_ms: 20,
            discovery_read_timeout_ms: 50,
            discovery_channel_capacity: 16,
            buffer_size: 8 * 1024,
            max_connections: 8,
            ..Self::default()
        }
    }

    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery_port = port;
        self
    }

    pub fn with_broadcast_addr(mut self, addr: IpAddr) -> Self {
        self.broadcast_addr = addr;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    pub fn with_ignore_file_name(mut self, name: impl Into<String>) -> Self {
        self.ignore_file_name = name.into();
        self
    }

    /// 비컨 목적지 소켓 주소
    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::new(self.broadcast_addr, self.discovery_port)
    }

    /// 탐색 리스너 바인드 소켓 주소
    pub fn discovery_bind(&self) -> SocketAddr {
        SocketAddr::new(self.discovery_bind_addr, self.discovery_port)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn discovery_read_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_read_timeout_ms)
    }
}

/// 수신 파일 기본 저장 위치 (사용자 다운로드 디렉터리)
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}
