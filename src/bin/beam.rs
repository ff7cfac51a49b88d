//! Beam - LAN 파일/폴더 전송
//!
//! 수신측은 TCP 포트를 열고 UDP 비컨으로 자신을 알리고,
//! 송신측은 비컨을 모아 목록을 보여준 뒤 고른 장치로 전송
//!
//! 사용법:
//!   beam receive [--port N] [--dest DIR]
//!   beam send <PATH>
//!
//! 예시:
//!   # 다운로드 폴더로 받기
//!   beam receive
//!
//!   # 폴더 전송 (.gitignore 규칙 적용)
//!   beam -v send ./project

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use beam::{
    default_download_dir, Acceptor, Client, Config, Error, Progress, ProgressEvent, Receiver,
    Sender, TcpDialer, UdpBroadcaster, UdpDiscoverer, DEFAULT_DISCOVERY_PORT,
};

#[derive(Parser)]
#[command(name = "beam")]
#[command(about = "LAN 파일/폴더 전송", long_about = None)]
#[command(version)]
struct Cli {
    /// 디버그 로그 출력
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 탐색 비컨 UDP 포트
    #[arg(long, global = true, default_value_t = DEFAULT_DISCOVERY_PORT)]
    discovery_port: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 연결을 기다렸다가 파일/폴더 수신
    Receive {
        /// 수신 TCP 포트 (0이면 임의 포트)
        #[arg(short, long, default_value_t = 0)]
        port: u16,

        /// 저장 폴더 (기본: 다운로드 폴더)
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },
    /// 파일 또는 폴더 전송
    Send {
        /// 전송할 경로
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 로깅 설정 (RUST_LOG가 있으면 우선)
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::new().with_discovery_port(cli.discovery_port);

    match cli.command {
        Commands::Receive { port, dest } => receive(config, port, dest).await?,
        Commands::Send { path } => send(config, path).await?,
    }

    Ok(())
}

async fn receive(
    config: Config,
    port: u16,
    dest: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = dest.unwrap_or_else(default_download_dir);
    tokio::fs::create_dir_all(&root)
        .await
        .map_err(|e| Error::path_io(&root, e))?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| Error::Bind { addr, source })?;

    let (progress, events) = Progress::channel(config.progress_channel_capacity);
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    let render = tokio::spawn(render_receive(spinner, events));

    let receiver = Receiver::new(&root, config.clone()).with_progress(progress);
    let acceptor = Acceptor::new(
        listener,
        receiver,
        UdpBroadcaster::new(config.clone()),
        config,
    );
    info!("저장 위치: {}", root.display());

    let shutdown = CancellationToken::new();
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("종료 요청");
            ctrl_c.cancel();
        }
    });

    acceptor.run(shutdown).await?;
    // 수락기가 끝나면 진행 핸들이 모두 drop되어 렌더 태스크도 종료
    let _ = render.await;
    Ok(())
}

async fn send(config: Config, path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let (progress, events) = Progress::channel(config.progress_channel_capacity);
    let bar = ProgressBar::hidden();
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({eta}) {msg}")?,
    );
    let render = tokio::spawn(render_send(bar, events));

    let client = Client::new(
        TcpDialer,
        UdpDiscoverer::new(config.clone()),
        Sender::new(config).with_progress(progress),
    );

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let stats = tokio::select! {
        r = client.dial_and_send(&path, input, std::io::stdout()) => r?,
        _ = tokio::signal::ctrl_c() => {
            info!("전송 취소");
            return Ok(());
        }
    };
    drop(client);
    let _ = render.await;

    info!("전송 완료: {}", stats.summary());
    Ok(())
}

/// 수신 진행 표시 (여러 연결의 이벤트가 섞일 수 있어 스피너 한 줄만 사용)
async fn render_receive(spinner: ProgressBar, mut events: mpsc::Receiver<ProgressEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::FileStarted { path, size, .. } => {
                spinner.set_message(format!("{} ({} bytes)", path, size));
            }
            ProgressEvent::FileBytes { .. } => spinner.tick(),
            ProgressEvent::FileDone { path, .. } => {
                spinner.println(format!("받음: {}", path));
            }
            ProgressEvent::FolderDone { path, .. } => {
                spinner.println(format!("폴더: {}", path));
            }
        }
    }
    spinner.finish_and_clear();
}

/// 송신 진행 표시 (파일마다 막대를 다시 채움)
async fn render_send(bar: ProgressBar, mut events: mpsc::Receiver<ProgressEvent>) {
    let mut shown = false;
    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::FileStarted { path, size, .. } => {
                if !shown {
                    bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                    shown = true;
                }
                bar.set_length(size);
                bar.set_position(0);
                bar.set_message(path);
            }
            ProgressEvent::FileBytes { transferred, .. } => bar.set_position(transferred),
            ProgressEvent::FileDone { path, .. } => bar.println(format!("보냄: {}", path)),
            ProgressEvent::FolderDone { path, .. } => bar.println(format!("폴더: {}", path)),
        }
    }
    bar.finish_and_clear();
}
