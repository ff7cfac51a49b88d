//! 송신 클라이언트
//!
//! 탐색 → 레지스트리 → 사용자 선택 → 접속 → 송신
//! - 소비 태스크가 탐색 스트림을 받아 중복 제거 후 목록을 다시 그림
//! - 메인 흐름은 선택 입력을 기다렸다가 송신을 직접 실행
//! - 반환 시 탐색 취소

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{Discoverer, Discovery};
use crate::registry::{Host, HostRegistry};
use crate::sender::Sender;
use crate::stats::TransferStats;
use crate::transport::Dialer;
use crate::{Error, Result};

/// 선택 프롬프트
pub const PROMPT: &str = "Choose a device to send to > ";

/// 목록 출력 대상 (소비 태스크와 메인 흐름이 공유)
type SharedOutput = Arc<Mutex<Box<dyn Write + Send>>>;

/// 송신 클라이언트
pub struct Client<D, S> {
    dialer: D,
    discoverer: S,
    sender: Sender,
    registry: Arc<HostRegistry>,
}

impl<D, S> Client<D, S>
where
    D: Dialer,
    S: Discoverer,
{
    pub fn new(dialer: D, discoverer: S, sender: Sender) -> Self {
        Self {
            dialer,
            discoverer,
            sender,
            registry: Arc::new(HostRegistry::new()),
        }
    }

    pub fn registry(&self) -> &Arc<HostRegistry> {
        &self.registry
    }

    /// 호스트를 고르게 한 뒤 `path`를 전송
    ///
    /// `input`은 한 줄에 하나의 ID, `output`은 호스트 목록과 프롬프트 출력용
    pub async fn dial_and_send<I, O>(&self, path: &Path, input: I, output: O) -> Result<TransferStats>
    where
        I: AsyncBufRead + Unpin,
        O: Write + Send + 'static,
    {
        tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::path_io(path, e))?;

        let output: SharedOutput = Arc::new(Mutex::new(Box::new(output)));
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let discovery = self.discoverer.discover(cancel.clone()).await;
        let consumer = spawn_consumer(discovery, self.registry.clone(), output.clone(), cancel.clone());

        let selected = self.select_host(input, &output).await;
        cancel.cancel();
        let _ = consumer.await;
        let host = selected?;

        let addr = host.socket_addr();
        info!("접속: {}", host);
        let conn = self
            .dialer
            .dial(addr)
            .await
            .map_err(|source| Error::Dial { addr, source })?;

        self.sender.send(path, conn).await
    }

    /// 유효한 ID가 들어올 때까지 반복
    async fn select_host<I>(&self, mut input: I, output: &SharedOutput) -> Result<Host>
    where
        I: AsyncBufRead + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line).await? == 0 {
                return Err(Error::InputClosed);
            }

            match parse_selection(&line).and_then(|id| self.registry.lookup(id)) {
                Ok(host) => return Ok(host),
                Err(e) => {
                    debug!("잘못된 선택: {}", e);
                    let message = match e {
                        Error::HostNotFound(id) => format!("Device with ID {} doesn't exist", id),
                        other => other.to_string(),
                    };
                    let mut out = output.lock();
                    let _ = writeln!(out, "{}", message);
                    let _ = write!(out, "{}", PROMPT);
                    let _ = out.flush();
                }
            }
        }
    }
}

/// 선택 입력 한 줄 파싱
pub fn parse_selection(line: &str) -> Result<u64> {
    let trimmed = line.trim();
    trimmed
        .parse::<u64>()
        .map_err(|_| Error::InvalidSelection(trimmed.to_string()))
}

/// 탐색 스트림 소비 태스크
fn spawn_consumer(
    discovery: Discovery,
    registry: Arc<HostRegistry>,
    output: SharedOutput,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let Discovery {
        mut hosts,
        mut errors,
    } = discovery;

    tokio::spawn(async move {
        let mut hosts_open = true;
        let mut errors_open = true;
        while hosts_open || errors_open {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                host = hosts.recv(), if hosts_open => match host {
                    Some(host) => {
                        let (id, is_new) = registry.insert(host);
                        if is_new {
                            debug!("새 호스트 id={}", id);
                            redraw(&registry, &output);
                        }
                    }
                    None => hosts_open = false,
                },
                err = errors.recv(), if errors_open => match err {
                    Some(e) => warn!("탐색 에러: {}", e),
                    None => errors_open = false,
                },
            }
        }
    })
}

/// 호스트 목록 + 프롬프트 출력
///
/// 레지스트리 락은 스냅샷을 뜨는 동안만 잡음
fn redraw(registry: &HostRegistry, output: &SharedOutput) {
    let entries = registry.snapshot();
    let mut out = output.lock();
    for entry in entries {
        let _ = writeln!(out, "\r{}. {}", entry.id, entry.host);
    }
    let _ = write!(out, "{}", PROMPT);
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
    use tokio::sync::mpsc;

    use crate::receiver::Receiver;
    use crate::Config;

    /// 정해진 호스트를 발행한 뒤 취소될 때까지 대기
    struct ScriptedDiscoverer {
        hosts: Vec<Host>,
    }

    #[async_trait]
    impl Discoverer for ScriptedDiscoverer {
        async fn discover(&self, cancel: CancellationToken) -> Discovery {
            let (hosts_tx, hosts) = mpsc::channel(8);
            let (errors_tx, errors) = mpsc::channel(8);
            let script = self.hosts.clone();
            tokio::spawn(async move {
                let _ = errors_tx
                    .send(Error::MalformedAnnouncement("garbage".into()))
                    .await;
                for host in script {
                    if hosts_tx.send(host).await.is_err() {
                        return;
                    }
                }
                cancel.cancelled().await;
            });
            Discovery { hosts, errors }
        }
    }

    /// 미리 만든 메모리 스트림을 한 번 돌려주는 접속기
    #[derive(Default)]
    struct DuplexDialer {
        conn: Mutex<Option<DuplexStream>>,
        dialed: Mutex<Vec<SocketAddr>>,
    }

    #[async_trait]
    impl Dialer for DuplexDialer {
        type Conn = DuplexStream;

        async fn dial(&self, addr: SocketAddr) -> io::Result<DuplexStream> {
            self.dialed.lock().push(addr);
            self.conn
                .lock()
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn peers() -> Vec<Host> {
        let alpha = Host::new("alpha", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 4000);
        let beta = Host::new("beta", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 4001);
        vec![alpha.clone(), beta, alpha]
    }

    /// 레지스트리에 `count`개가 모이면 `script`를 입력
    fn type_when_ready(
        registry: Arc<HostRegistry>,
        count: usize,
        script: &'static str,
    ) -> BufReader<DuplexStream> {
        let (mut keyboard, input) = tokio::io::duplex(256);
        tokio::spawn(async move {
            while registry.len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            keyboard.write_all(script.as_bytes()).await.unwrap();
        });
        BufReader::new(input)
    }

    #[tokio::test]
    async fn test_select_reprompt_and_send() {
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let file = src.path().join("hello.txt");
        std::fs::write(&file, b"hello beam").unwrap();

        let (client_end, server_end) = tokio::io::duplex(16 * 1024);
        let receiver = Receiver::new(dest.path(), Config::local_test());
        let receiving = tokio::spawn(async move { receiver.receive(server_end).await });

        let dialer = DuplexDialer::default();
        *dialer.conn.lock() = Some(client_end);
        let client = Client::new(
            dialer,
            ScriptedDiscoverer { hosts: peers() },
            Sender::new(Config::local_test()),
        );

        let input = type_when_ready(client.registry().clone(), 2, "abc\n7\n2\n");
        let out = SharedBuf::default();
        let stats = client.dial_and_send(&file, input, out.clone()).await.unwrap();

        assert_eq!(stats.files, 1);
        assert_eq!(stats.total_bytes, 10);
        assert_eq!(client.registry().len(), 2);
        assert_eq!(
            client.dialer.dialed.lock().as_slice(),
            &["10.0.0.2:4001".parse::<SocketAddr>().unwrap()]
        );

        let received = receiving.await.unwrap().unwrap();
        assert_eq!(received.files, 1);
        assert_eq!(
            std::fs::read(dest.path().join("hello.txt")).unwrap(),
            b"hello beam"
        );

        let text = out.text();
        assert!(text.contains("1. alpha -- 10.0.0.1:4000"));
        assert!(text.contains("2. beta -- 10.0.0.2:4001"));
        assert!(text.contains("Device with ID 7 doesn't exist"));
        assert!(text.contains(PROMPT));
    }

    #[tokio::test]
    async fn test_input_closed() {
        let src = tempfile::tempdir().unwrap();
        let client = Client::new(
            DuplexDialer::default(),
            ScriptedDiscoverer { hosts: peers() },
            Sender::new(Config::local_test()),
        );

        let result = client
            .dial_and_send(src.path(), &b""[..], SharedBuf::default())
            .await;
        assert!(matches!(result, Err(Error::InputClosed)));
        assert!(client.dialer.dialed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dial_failure_is_fatal() {
        let src = tempfile::tempdir().unwrap();
        let client = Client::new(
            DuplexDialer::default(),
            ScriptedDiscoverer { hosts: peers() },
            Sender::new(Config::local_test()),
        );

        let input = type_when_ready(client.registry().clone(), 1, "1\n");
        let result = client
            .dial_and_send(src.path(), input, SharedBuf::default())
            .await;
        assert!(matches!(result, Err(Error::Dial { .. })));
    }

    #[tokio::test]
    async fn test_missing_path_fails_before_discovery() {
        let src = tempfile::tempdir().unwrap();
        let client = Client::new(
            DuplexDialer::default(),
            ScriptedDiscoverer { hosts: peers() },
            Sender::new(Config::local_test()),
        );

        let result = client
            .dial_and_send(&src.path().join("nope"), &b"1\n"[..], SharedBuf::default())
            .await;
        assert!(matches!(result, Err(Error::PathIo { .. })));
        assert!(client.registry().is_empty());
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("3\n").unwrap(), 3);
        assert_eq!(parse_selection("  12 \r\n").unwrap(), 12);
        assert!(matches!(
            parse_selection("abc\n"),
            Err(Error::InvalidSelection(s)) if s == "abc"
        ));
        assert!(matches!(parse_selection("-1"), Err(Error::InvalidSelection(_))));
    }
}
