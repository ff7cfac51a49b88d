//! 수신자 (연결당 하나)
//!
//! - 프레임을 순서대로 읽어 목적지 루트 아래에 복원
//! - 타입 바이트 위치의 EOF는 정상 종료
//! - 파일 복사 실패 시 부분 파일 삭제 후 연결 중단
//! - 루트 밖으로 벗어나는 경로는 프로토콜 에러

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::acceptor::ConnectionHandler;
use crate::frame::{FrameHeader, FrameReader};
use crate::stats::{Progress, ProgressEvent, TransferStats};
use crate::{Config, Error, Result};

/// 수신자
#[derive(Debug, Clone)]
pub struct Receiver {
    root: PathBuf,
    config: Config,
    progress: Progress,
}

impl Receiver {
    /// `root` 아래에 수신 파일을 만드는 수신자
    pub fn new(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
            progress: Progress::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// 연결 하나의 프레임 스트림을 끝까지 처리
    pub async fn receive<R>(&self, conn: R) -> Result<TransferStats>
    where
        R: AsyncRead + Unpin,
    {
        let mut reader =
            FrameReader::with_limits(self.config.buffer_size, self.config.max_path_len, conn);
        let mut stats = TransferStats::new();

        while let Some(header) = reader.next_header().await? {
            let dest = resolve_destination(&self.root, header.path())?;

            match header {
                FrameHeader::Folder { path } => {
                    fs::create_dir_all(&dest)
                        .await
                        .map_err(|e| Error::path_io(&dest, e))?;
                    let index = stats.record_folder();
                    self.progress.report(ProgressEvent::FolderDone { index, path });
                }
                FrameHeader::File { path, size } => {
                    self.receive_file(&mut reader, &dest, path, size, &mut stats)
                        .await?;
                }
            }
        }

        Ok(stats)
    }

    async fn receive_file<R>(
        &self,
        reader: &mut FrameReader<R>,
        dest: &Path,
        path: String,
        size: u64,
        stats: &mut TransferStats,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::path_io(parent, e))?;
        }

        let index = stats.begin_file();
        self.progress.report(ProgressEvent::FileStarted {
            index,
            path: path.clone(),
            size,
        });

        let mut file = File::create(dest)
            .await
            .map_err(|e| Error::path_io(dest, e))?;

        let progress = &self.progress;
        let copied = async {
            let n = reader
                .read_content(&path, size, &mut file, |transferred| {
                    progress.report(ProgressEvent::FileBytes {
                        index,
                        transferred,
                        size,
                    })
                })
                .await?;
            file.flush().await?;
            Ok::<u64, Error>(n)
        }
        .await;
        drop(file);

        match copied {
            Ok(n) => {
                stats.record_bytes(n);
                self.progress.report(ProgressEvent::FileDone { index, path });
                debug!("파일 수신: {} ({} bytes)", dest.display(), n);
                Ok(())
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(dest).await {
                    warn!("부분 파일 삭제 실패 ({}): {}", dest.display(), rm);
                }
                Err(match e {
                    Error::Io(source) => Error::path_io(dest, source),
                    other => other,
                })
            }
        }
    }
}

#[async_trait]
impl<C> ConnectionHandler<C> for Receiver
where
    C: AsyncRead + Unpin + Send + 'static,
{
    async fn handle(&self, conn: C, peer: SocketAddr) -> Result<TransferStats> {
        debug!("수신 시작: {}", peer);
        let stats = self.receive(conn).await?;
        info!(%peer, "수신 완료: {}", stats.summary());
        Ok(stats)
    }
}

/// 와이어 경로를 목적지 루트 아래 경로로 변환
///
/// `/` 구분 상대 경로만 허용. `..`, 절대 경로, 빈 경로, 역슬래시, 드라이브 접두사,
/// NUL 바이트는 거부
pub fn resolve_destination(root: &Path, wire_path: &str) -> Result<PathBuf> {
    let reject = || Error::PathTraversal(wire_path.to_string());

    if wire_path.is_empty()
        || wire_path.starts_with('/')
        || wire_path.contains('\\')
        || wire_path.contains('\0')
    {
        return Err(reject());
    }

    let mut dest = root.to_path_buf();
    let mut depth = 0usize;
    for segment in wire_path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(reject()),
            _ => {}
        }

        // 각 구간이 일반 이름 하나로만 해석되는지 확인 (예: "C:")
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => return Err(reject()),
        }
        if segment.contains(':') && cfg!(windows) {
            return Err(reject());
        }

        dest.push(segment);
        depth += 1;
    }

    if depth == 0 {
        return Err(reject());
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameWriter;

    #[test]
    fn test_resolve_accepts_nested_paths() {
        let root = Path::new("/downloads");
        assert_eq!(
            resolve_destination(root, "docs/b.txt").unwrap(),
            root.join("docs").join("b.txt")
        );
        assert_eq!(
            resolve_destination(root, "docs/./x//y").unwrap(),
            root.join("docs").join("x").join("y")
        );
        assert_eq!(
            resolve_destination(root, "데이터/ファイル").unwrap(),
            root.join("데이터").join("ファイル")
        );
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let root = Path::new("/downloads");
        for bad in [
            "",
            ".",
            "./",
            "..",
            "../evil",
            "docs/../../evil",
            "docs/..",
            "/etc/passwd",
            "docs\\..\\evil",
            "a\0b",
        ] {
            let err = resolve_destination(root, bad).unwrap_err();
            assert!(err.is_protocol(), "{bad:?} should be rejected");
        }
    }

    async fn wire_of(headers: &[(FrameHeader, Vec<u8>)]) -> Vec<u8> {
        let mut wire = Vec::new();
        let mut writer = FrameWriter::new(&mut wire);
        for (header, content) in headers {
            match header {
                FrameHeader::Folder { path } => writer.write_folder(path).await.unwrap(),
                FrameHeader::File { path, size } => {
                    let mut content = content.as_slice();
                    writer.write_file(path, *size, &mut content, |_| {}).await.unwrap();
                }
            }
        }
        writer.finish().await.unwrap();
        drop(writer);
        wire
    }

    #[tokio::test]
    async fn test_receive_builds_tree() {
        let dest = tempfile::tempdir().unwrap();
        let wire = wire_of(&[
            (FrameHeader::folder("docs"), vec![]),
            (FrameHeader::file("docs/b.txt", 5), b"hello".to_vec()),
            (FrameHeader::folder("docs/sub"), vec![]),
            (FrameHeader::file("docs/sub/empty", 0), vec![]),
        ])
        .await;

        let receiver = Receiver::new(dest.path(), Config::default());
        let stats = receiver.receive(wire.as_slice()).await.unwrap();

        assert_eq!(stats.files, 2);
        assert_eq!(stats.folders, 2);
        assert_eq!(std::fs::read(dest.path().join("docs/b.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(dest.path().join("docs/sub/empty")).unwrap(), b"");
    }

    #[tokio::test]
    async fn test_existing_folder_and_file_are_reused() {
        let dest = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dest.path().join("docs")).unwrap();
        std::fs::write(dest.path().join("docs/b.txt"), b"old content that is longer").unwrap();

        let wire = wire_of(&[
            (FrameHeader::folder("docs"), vec![]),
            (FrameHeader::file("docs/b.txt", 3), b"new".to_vec()),
        ])
        .await;
        Receiver::new(dest.path(), Config::default())
            .receive(wire.as_slice())
            .await
            .unwrap();

        // 기존 파일은 잘림
        assert_eq!(std::fs::read(dest.path().join("docs/b.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_truncated_file_is_removed() {
        let dest = tempfile::tempdir().unwrap();
        let mut wire = FrameHeader::file("partial.bin", 100).to_bytes().to_vec();
        wire.extend_from_slice(&[1u8; 40]);

        let err = Receiver::new(dest.path(), Config::default())
            .receive(wire.as_slice())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Truncated { received: 40, .. }));
        assert!(!dest.path().join("partial.bin").exists());
    }

    #[tokio::test]
    async fn test_traversal_frame_aborts_connection() {
        let parent = tempfile::tempdir().unwrap();
        let dest = parent.path().join("root");
        std::fs::create_dir_all(&dest).unwrap();

        let wire = wire_of(&[
            (FrameHeader::file("../escaped.txt", 4), b"evil".to_vec()),
            (FrameHeader::file("after.txt", 2), b"ok".to_vec()),
        ])
        .await;

        let err = Receiver::new(&dest, Config::default())
            .receive(wire.as_slice())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PathTraversal(_)));
        assert!(!parent.path().join("escaped.txt").exists());
        assert!(!dest.join("after.txt").exists());
    }

    #[tokio::test]
    async fn test_empty_stream_is_success() {
        let dest = tempfile::tempdir().unwrap();
        let stats = Receiver::new(dest.path(), Config::default())
            .receive(&b""[..])
            .await
            .unwrap();
        assert_eq!(stats.frames, 0);
    }

    #[tokio::test]
    async fn test_unknown_frame_type_aborts() {
        let dest = tempfile::tempdir().unwrap();
        let err = Receiver::new(dest.path(), Config::default())
            .receive(&[2u8, 0, 0, 0, 0][..])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownFrameType(2)));
    }
}
