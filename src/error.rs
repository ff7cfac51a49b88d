//! 에러 타입 정의

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Beam 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO 에러 ({}): {source}", .path.display())]
    PathIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("리스너 바인드 실패 ({addr}): {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("비컨 소켓 준비 실패: {0}")]
    BeaconStartup(#[source] std::io::Error),

    #[error("수신자 연결 실패 ({addr}): {source}")]
    Dial {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("잘못된 비컨 페이로드: {0:?}")]
    MalformedAnnouncement(String),

    #[error("비컨 포트 파싱 실패: {raw:?}")]
    InvalidPort { raw: String },

    #[error("알 수 없는 프레임 타입: {0}")]
    UnknownFrameType(u8),

    #[error("경로 길이 초과: {len} > {max}")]
    PathTooLong { len: usize, max: usize },

    #[error("경로가 UTF-8이 아님")]
    InvalidPathEncoding,

    #[error("목적지 루트를 벗어나는 경로: {0:?}")]
    PathTraversal(String),

    #[error("전송 루트가 유효하지 않음: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error("프레임 헤더 조기 종료")]
    TruncatedHeader,

    #[error("스트림 조기 종료: {path}, expected {expected} bytes, got {received}")]
    Truncated {
        path: String,
        expected: u64,
        received: u64,
    },

    #[error("호스트 없음: id={0}")]
    HostNotFound(u64),

    #[error("잘못된 선택: {0:?}")]
    InvalidSelection(String),

    #[error("입력 종료")]
    InputClosed,

    #[error("채널 에러")]
    ChannelError,
}

impl Error {
    /// 파일 경로 컨텍스트를 붙인 IO 에러
    pub fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::PathIo {
            path: path.into(),
            source,
        }
    }

    /// 연결 하나만 중단시키는 프로토콜 에러 여부
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Error::UnknownFrameType(_)
                | Error::PathTooLong { .. }
                | Error::InvalidPathEncoding
                | Error::PathTraversal(_)
                | Error::TruncatedHeader
                | Error::Truncated { .. }
        )
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
