//! 연결 생성 추상화
//!
//! 테스트에서 메모리 스트림으로 바꿔 끼울 수 있도록 생성 시 주입

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// 송신측 연결 생성기
#[async_trait]
pub trait Dialer: Send + Sync {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn dial(&self, addr: SocketAddr) -> io::Result<Self::Conn>;
}

/// TCP 연결 생성기
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    type Conn = TcpStream;

    async fn dial(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// 수신측 연결 수락기
#[async_trait]
pub trait Listener: Send {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// 바인드된 로컬 주소 (비컨에 포트를 싣기 위해 사용)
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// 다음 연결
    ///
    /// 리스너가 닫혔으면 `Ok(None)` (에러 아님)
    async fn accept(&mut self) -> io::Result<Option<(Self::Conn, SocketAddr)>>;
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpStream;

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }

    async fn accept(&mut self) -> io::Result<Option<(TcpStream, SocketAddr)>> {
        let (stream, peer) = TcpListener::accept(self).await?;
        Ok(Some((stream, peer)))
    }
}
