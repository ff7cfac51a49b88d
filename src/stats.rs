//! 전송 통계 및 진행 이벤트

use std::time::{Duration, Instant};

use tokio::sync::mpsc;

/// 진행 이벤트 (외부 UI 소비용)
///
/// 모든 값은 누적값이므로 중간 이벤트가 유실돼도 다음 이벤트로 복구됨
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// 폴더 프레임 처리 완료
    FolderDone { index: u64, path: String },

    /// 파일 프레임 시작
    FileStarted { index: u64, path: String, size: u64 },

    /// 현재 파일의 누적 전송 바이트
    FileBytes {
        index: u64,
        transferred: u64,
        size: u64,
    },

    /// 파일 프레임 완료
    FileDone { index: u64, path: String },
}

/// 진행 이벤트 송신 핸들
///
/// `try_send`만 사용하므로 채널이 가득 차도 전송을 막지 않음
#[derive(Debug, Clone, Default)]
pub struct Progress {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl Progress {
    /// 이벤트를 버리는 핸들
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// 용량 `capacity`의 채널 생성
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub fn report(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }
}

/// 연결 하나의 전송 통계
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 처리한 프레임 수 (폴더 + 파일)
    pub frames: u64,

    /// 파일 프레임 수
    pub files: u64,

    /// 폴더 프레임 수
    pub folders: u64,

    /// 파일 내용 총 바이트
    pub total_bytes: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames: 0,
            files: 0,
            folders: 0,
            total_bytes: 0,
        }
    }

    /// 폴더 프레임 기록, 프레임 순번 반환
    pub fn record_folder(&mut self) -> u64 {
        self.folders += 1;
        self.frames += 1;
        self.frames
    }

    /// 파일 프레임 시작 기록, 프레임 순번 반환
    pub fn begin_file(&mut self) -> u64 {
        self.files += 1;
        self.frames += 1;
        self.frames
    }

    pub fn record_bytes(&mut self, n: u64) {
        self.total_bytes += n;
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 전체 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_bytes as f64 / elapsed
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Files: {} | Folders: {} | Bytes: {} | Throughput: {:.2} MB/s",
            self.elapsed().as_secs_f64(),
            self.files,
            self.folders,
            self.total_bytes,
            self.throughput() / 1_000_000.0,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}
