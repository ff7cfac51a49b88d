//! # Beam
//!
//! 로컬 네트워크 자동 탐색 + TCP 기반 파일/디렉터리 스트리밍
//!
//! ## 핵심 특징
//! - **브로드캐스트 탐색**: UDP 비컨으로 `"<hostname>|<port>"` 주기 송출
//! - **호스트 레지스트리**: (주소, 포트) 기준 중복 제거, 최초 발견 순 ID
//! - **프레임 스트림**: 폴더/파일 프레임을 단일 TCP 스트림으로 전송, 연결 종료가 곧 전송 완료
//! - **무시 규칙**: 전송 루트의 ignore 파일로 하위 트리 전체 제외
//! - **경로 검증**: 목적지 루트 밖으로 벗어나는 경로는 프로토콜 에러
//! - **우아한 종료**: 수락 중단 후 진행 중인 수신 작업을 모두 기다림

pub mod acceptor;
pub mod beacon;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod ignore_set;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod stats;
pub mod transport;

pub use acceptor::{Acceptor, ConnectionHandler};
pub use beacon::{Beacon, Broadcaster, UdpBroadcaster};
pub use client::Client;
pub use config::{default_download_dir, Config};
pub use discovery::{Discoverer, Discovery, DiscoveryListener, UdpDiscoverer};
pub use error::{Error, Result};
pub use frame::{FrameHeader, FrameKind, FrameReader, FrameWriter};
pub use ignore_set::IgnoreSet;
pub use receiver::Receiver;
pub use registry::{Host, HostRegistry, RegistryEntry};
pub use sender::Sender;
pub use stats::{Progress, ProgressEvent, TransferStats};
pub use transport::{Dialer, Listener, TcpDialer};

/// 기본 탐색(브로드캐스트) 포트
pub const DEFAULT_DISCOVERY_PORT: u16 = 9999;

/// 기본 비컨 송출 간격 (밀리초)
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 1000;

/// 탐색 소켓 읽기 데드라인 (밀리초)
pub const DEFAULT_DISCOVERY_READ_TIMEOUT_MS: u64 = 3000;

/// 기본 I/O 버퍼 크기 (바이트)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024; // 64KB

/// 프레임 경로 최대 길이 (바이트)
pub const DEFAULT_MAX_PATH_LEN: usize = 4096;

/// 비컨 페이로드 구분자
pub const ANNOUNCEMENT_SEPARATOR: char = '|';
