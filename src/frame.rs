//! 와이어 프레임 코덱
//!
//! 연결당 단일 순서 스트림, 송신자 → 수신자
//!
//! ```text
//! Frame := type:u8 (0=file, 1=folder)
//!          path_len:u32 (big-endian)
//!          path:utf8[path_len]
//!          [ size:u64 (big-endian)  type==file ]
//!          [ content:byte[size]     type==file ]
//! ```
//!
//! 종료 프레임은 없음. 타입 바이트 위치에서의 EOF가 정상 종료

use std::io::ErrorKind;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
};

use crate::{Error, Result, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_PATH_LEN};

/// 프레임 타입 바이트
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// 파일 헤더 + 내용
    File = 0,

    /// 폴더 마커
    Folder = 1,
}

impl TryFrom<u8> for FrameKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FrameKind::File),
            1 => Ok(FrameKind::Folder),
            other => Err(Error::UnknownFrameType(other)),
        }
    }
}

/// 프레임 헤더 (파일 내용은 스트림으로 별도 처리)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameHeader {
    Folder { path: String },
    File { path: String, size: u64 },
}

impl FrameHeader {
    pub fn folder(path: impl Into<String>) -> Self {
        FrameHeader::Folder { path: path.into() }
    }

    pub fn file(path: impl Into<String>, size: u64) -> Self {
        FrameHeader::File {
            path: path.into(),
            size,
        }
    }

    pub fn kind(&self) -> FrameKind {
        match self {
            FrameHeader::Folder { .. } => FrameKind::Folder,
            FrameHeader::File { .. } => FrameKind::File,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FrameHeader::Folder { path } | FrameHeader::File { path, .. } => path,
        }
    }

    /// 인코딩된 헤더 크기 (내용 제외)
    pub fn encoded_len(&self) -> usize {
        let base = 1 + 4 + self.path().len();
        match self {
            FrameHeader::Folder { .. } => base,
            FrameHeader::File { .. } => base + 8,
        }
    }

    /// 버퍼에 헤더 인코딩
    pub fn encode(&self, buf: &mut BytesMut) {
        let path = self.path().as_bytes();
        buf.reserve(self.encoded_len());
        buf.put_u8(self.kind() as u8);
        buf.put_u32(path.len() as u32);
        buf.put_slice(path);
        if let FrameHeader::File { size, .. } = self {
            buf.put_u64(*size);
        }
    }

    /// 헤더를 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// 버퍼 앞에서 헤더 하나 디코딩
    ///
    /// 헤더가 아직 다 도착하지 않았으면 아무것도 소비하지 않고 `Ok(None)`
    pub fn decode(buf: &mut BytesMut, max_path_len: usize) -> Result<Option<Self>> {
        if buf.is_empty() {
            return Ok(None);
        }

        let kind = FrameKind::try_from(buf[0])?;
        if buf.len() < 5 {
            return Ok(None);
        }

        let path_len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        if path_len > max_path_len {
            return Err(Error::PathTooLong {
                len: path_len,
                max: max_path_len,
            });
        }

        let needed = 5 + path_len + if kind == FrameKind::File { 8 } else { 0 };
        if buf.len() < needed {
            return Ok(None);
        }

        buf.advance(5);
        let path = String::from_utf8(buf.split_to(path_len).to_vec())
            .map_err(|_| Error::InvalidPathEncoding)?;

        Ok(Some(match kind {
            FrameKind::Folder => FrameHeader::Folder { path },
            FrameKind::File => FrameHeader::File {
                path,
                size: buf.get_u64(),
            },
        }))
    }
}

/// 헤더 필드 읽기 중 EOF는 프로토콜 에러
fn header_eof(e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::UnexpectedEof {
        Error::TruncatedHeader
    } else {
        Error::Io(e)
    }
}

/// 프레임 송신기
pub struct FrameWriter<W> {
    inner: BufWriter<W>,
    header_buf: BytesMut,
    chunk: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, inner)
    }

    pub fn with_capacity(buffer_size: usize, inner: W) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            inner: BufWriter::with_capacity(buffer_size, inner),
            header_buf: BytesMut::with_capacity(256),
            chunk: vec![0u8; buffer_size],
        }
    }

    /// 헤더만 기록 (파일 내용은 호출자가 이어서 기록해야 함)
    pub async fn write_header(&mut self, header: &FrameHeader) -> Result<()> {
        self.header_buf.clear();
        header.encode(&mut self.header_buf);
        self.inner.write_all(&self.header_buf).await?;
        Ok(())
    }

    /// 폴더 프레임 기록
    pub async fn write_folder(&mut self, path: &str) -> Result<()> {
        self.write_header(&FrameHeader::folder(path)).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// 파일 프레임 기록
    ///
    /// `content`에서 정확히 `size` 바이트를 보냄. 원본이 먼저 끝나면 `Truncated`.
    /// `on_progress`는 누적 바이트로 호출됨
    pub async fn write_file<R, F>(
        &mut self,
        path: &str,
        size: u64,
        content: &mut R,
        mut on_progress: F,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin,
        F: FnMut(u64),
    {
        self.write_header(&FrameHeader::file(path, size)).await?;

        let mut sent = 0u64;
        while sent < size {
            let want = (size - sent).min(self.chunk.len() as u64) as usize;
            let n = content.read(&mut self.chunk[..want]).await?;
            if n == 0 {
                return Err(Error::Truncated {
                    path: path.to_string(),
                    expected: size,
                    received: sent,
                });
            }
            self.inner.write_all(&self.chunk[..n]).await?;
            sent += n as u64;
            on_progress(sent);
        }

        self.inner.flush().await?;
        Ok(sent)
    }

    /// 버퍼 비우고 쓰기 방향 종료 (수신측에 EOF 전달)
    pub async fn finish(&mut self) -> Result<()> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

/// 프레임 수신기
pub struct FrameReader<R> {
    inner: BufReader<R>,
    max_path_len: usize,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limits(DEFAULT_BUFFER_SIZE, DEFAULT_MAX_PATH_LEN, inner)
    }

    pub fn with_limits(buffer_size: usize, max_path_len: usize, inner: R) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            inner: BufReader::with_capacity(buffer_size, inner),
            max_path_len,
            chunk: vec![0u8; buffer_size],
        }
    }

    /// 다음 프레임 헤더
    ///
    /// 타입 바이트 위치에서 EOF면 `Ok(None)` (정상 종료)
    pub async fn next_header(&mut self) -> Result<Option<FrameHeader>> {
        let mut kind = [0u8; 1];
        if self.inner.read(&mut kind).await? == 0 {
            return Ok(None);
        }
        let kind = FrameKind::try_from(kind[0])?;

        let path_len = self.inner.read_u32().await.map_err(header_eof)? as usize;
        if path_len > self.max_path_len {
            return Err(Error::PathTooLong {
                len: path_len,
                max: self.max_path_len,
            });
        }

        let mut raw = vec![0u8; path_len];
        self.inner.read_exact(&mut raw).await.map_err(header_eof)?;
        let path = String::from_utf8(raw).map_err(|_| Error::InvalidPathEncoding)?;

        Ok(Some(match kind {
            FrameKind::Folder => FrameHeader::Folder { path },
            FrameKind::File => {
                let size = self.inner.read_u64().await.map_err(header_eof)?;
                FrameHeader::File { path, size }
            }
        }))
    }

    /// 파일 내용 `size` 바이트를 `sink`로 복사
    ///
    /// 스트림이 먼저 끝나면 `Truncated`
    pub async fn read_content<W, F>(
        &mut self,
        path: &str,
        size: u64,
        sink: &mut W,
        mut on_progress: F,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
        F: FnMut(u64),
    {
        let mut received = 0u64;
        while received < size {
            let want = (size - received).min(self.chunk.len() as u64) as usize;
            let n = self.inner.read(&mut self.chunk[..want]).await?;
            if n == 0 {
                return Err(Error::Truncated {
                    path: path.to_string(),
                    expected: size,
                    received,
                });
            }
            sink.write_all(&self.chunk[..n]).await?;
            received += n as u64;
            on_progress(received);
        }
        Ok(received)
    }
}
