//! 송신자
//!
//! - 전송 루트가 파일이면 파일 프레임 하나
//! - 디렉터리면 사전순 깊이 우선 전위 순회, 폴더 프레임이 항상 하위 항목보다 먼저
//! - 무시 규칙에 걸린 하위 트리는 통째로 제외
//! - 에러가 나면 즉시 중단, 재시도 없음

use std::path::{Component, Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::AsyncWrite;
use tracing::{debug, info, warn};

use crate::frame::FrameWriter;
use crate::ignore_set::IgnoreSet;
use crate::stats::{Progress, ProgressEvent, TransferStats};
use crate::{Config, Error, Result};

/// 순회 작업 단위
enum WalkItem {
    Dir { path: PathBuf, wire: String },
    File { path: PathBuf, wire: String },
}

/// 송신자
#[derive(Debug, Clone)]
pub struct Sender {
    config: Config,
    progress: Progress,
}

impl Sender {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            progress: Progress::disabled(),
        }
    }

    /// 진행 이벤트 연결
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    /// `root`를 이미 연결된 `conn`으로 전송
    ///
    /// 끝나면 쓰기 방향을 닫아 수신측에 종료를 알림
    pub async fn send<W>(&self, root: &Path, conn: W) -> Result<TransferStats>
    where
        W: AsyncWrite + Unpin,
    {
        // 이름은 사용자가 준 경로에서, 읽기는 실제 경로에서
        let base = base_name(root)?;
        let root = fs::canonicalize(root)
            .await
            .map_err(|e| Error::path_io(root, e))?;
        let meta = fs::metadata(&root)
            .await
            .map_err(|e| Error::path_io(&root, e))?;

        let mut writer = FrameWriter::with_capacity(self.config.buffer_size, conn);
        let mut stats = TransferStats::new();

        if meta.is_file() {
            self.send_file(&mut writer, &root, &base, &mut stats).await?;
        } else if meta.is_dir() {
            self.send_tree(&mut writer, &root, base, &mut stats).await?;
        } else {
            return Err(Error::InvalidRoot(root));
        }

        writer.finish().await?;
        info!(
            "전송 완료: {} 파일, {} 폴더 ({})",
            stats.files,
            stats.folders,
            stats.summary()
        );
        Ok(stats)
    }

    async fn send_tree<W>(
        &self,
        writer: &mut FrameWriter<W>,
        root: &Path,
        base: String,
        stats: &mut TransferStats,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let ignore = IgnoreSet::load(root, &self.config.ignore_file_name).await;
        let rules_file = root.join(&self.config.ignore_file_name);

        let mut stack = vec![WalkItem::Dir {
            path: root.to_path_buf(),
            wire: base,
        }];

        while let Some(item) = stack.pop() {
            match item {
                WalkItem::File { path, wire } => {
                    self.send_file(writer, &path, &wire, stats).await?;
                }
                WalkItem::Dir { path, wire } => {
                    writer
                        .write_folder(&wire)
                        .await
                        .map_err(|e| with_path(e, &path))?;
                    let index = stats.record_folder();
                    self.progress.report(ProgressEvent::FolderDone {
                        index,
                        path: wire.clone(),
                    });

                    let children = self
                        .read_children(root, &path, &wire, &ignore, &rules_file)
                        .await?;
                    // 스택이므로 역순으로 넣어야 사전순으로 나옴
                    stack.extend(children.into_iter().rev());
                }
            }
        }

        Ok(())
    }

    /// 디렉터리 하나의 자식 목록 (사전순, 무시 규칙 적용)
    async fn read_children(
        &self,
        root: &Path,
        dir: &Path,
        dir_wire: &str,
        ignore: &IgnoreSet,
        rules_file: &Path,
    ) -> Result<Vec<WalkItem>> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| Error::path_io(dir, e))?;

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::path_io(dir, e))?
        {
            found.push(entry);
        }
        found.sort_by_key(|entry| entry.file_name());

        let mut children = Vec::with_capacity(found.len());
        for entry in found {
            let path = entry.path();
            if path == rules_file {
                continue;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                return Err(Error::path_io(
                    &path,
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "UTF-8이 아닌 파일 이름"),
                ));
            };

            // 링크를 따라가기 전에 무시 규칙부터 (끊어진 링크도 조용히 제외)
            let mut file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::path_io(&path, e))?;
            let relative = path.strip_prefix(root).unwrap_or(&path);
            if ignore.is_ignored(relative, file_type.is_dir()) {
                debug!("무시 규칙으로 제외: {}", relative.display());
                continue;
            }

            if file_type.is_symlink() {
                file_type = fs::metadata(&path)
                    .await
                    .map_err(|e| Error::path_io(&path, e))?
                    .file_type();
                if file_type.is_dir() {
                    warn!("디렉터리 심볼릭 링크 건너뜀: {}", path.display());
                    continue;
                }
            }

            let wire = format!("{}/{}", dir_wire, name);
            if file_type.is_dir() {
                children.push(WalkItem::Dir { path, wire });
            } else if file_type.is_file() {
                children.push(WalkItem::File { path, wire });
            } else {
                warn!("특수 파일 건너뜀: {}", path.display());
            }
        }

        Ok(children)
    }

    async fn send_file<W>(
        &self,
        writer: &mut FrameWriter<W>,
        path: &Path,
        wire: &str,
        stats: &mut TransferStats,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut file = File::open(path)
            .await
            .map_err(|e| Error::path_io(path, e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| Error::path_io(path, e))?
            .len();

        let index = stats.begin_file();
        self.progress.report(ProgressEvent::FileStarted {
            index,
            path: wire.to_string(),
            size,
        });

        let progress = &self.progress;
        let sent = writer
            .write_file(wire, size, &mut file, |transferred| {
                progress.report(ProgressEvent::FileBytes {
                    index,
                    transferred,
                    size,
                })
            })
            .await
            .map_err(|e| with_path(e, path))?;

        stats.record_bytes(sent);
        self.progress.report(ProgressEvent::FileDone {
            index,
            path: wire.to_string(),
        });
        debug!("파일 전송: {} ({} bytes)", wire, sent);
        Ok(())
    }
}

/// 전송 루트의 와이어 이름
///
/// 링크를 풀지 않고 `.`/`..`만 어휘적으로 정리한 경로의 마지막 구간
fn base_name(root: &Path) -> Result<String> {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| Error::path_io(root, e))?
            .join(root)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    normalized
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidRoot(root.to_path_buf()))
}

/// 경로 정보 없는 IO 에러에 현재 경로를 붙임
fn with_path(e: Error, path: &Path) -> Error {
    match e {
        Error::Io(source) => Error::path_io(path, source),
        other => other,
    }
}
