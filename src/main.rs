use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use practice_capture::{
    create_router, spawn_progress_listener, AppState, CaptureBackends, Config, MediaCaptureSession,
    MediaConstraints, PracticeMode, ProgressStore, SessionConfig, SyntheticGateway, WavInfo,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "practice-capture")]
#[command(about = "Camera/microphone capture sessions for speaking practice")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/practice-capture")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP control API
    Serve {
        #[arg(long, value_enum, default_value = "voice")]
        mode: ModeArg,
    },
    /// Record one take with the synthetic devices and download it
    Record {
        /// Take length in seconds
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Also acquire the camera
        #[arg(long)]
        video: bool,

        /// Skip the microphone
        #[arg(long)]
        no_audio: bool,

        #[arg(long, value_enum, default_value = "voice")]
        mode: ModeArg,
    },
    /// Show (or reset) challenge progress
    Progress {
        #[arg(long)]
        reset: bool,
    },
    /// Summarize an exported WAV take
    Inspect { path: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Voice,
    Challenge,
    Mirror,
}

impl From<ModeArg> for PracticeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Voice => PracticeMode::Voice,
            ModeArg::Challenge => PracticeMode::Challenge,
            ModeArg::Mirror => PracticeMode::Mirror,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Practice Capture v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Serve { mode } => serve(cfg, mode.into()).await,
        Command::Record {
            seconds,
            video,
            no_audio,
            mode,
        } => record(cfg, seconds, video, !no_audio, mode.into()).await,
        Command::Progress { reset } => progress(cfg, reset).await,
        Command::Inspect { path } => {
            let info = WavInfo::open(&path)?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}

fn build_session(cfg: &Config, mode: PracticeMode) -> MediaCaptureSession {
    let gateway = Arc::new(SyntheticGateway::new(cfg.synthetic.clone()));
    let backends = CaptureBackends::headless(gateway, cfg.export.download_dir.clone());
    MediaCaptureSession::new(SessionConfig::from_settings(&cfg.capture, mode), backends)
}

async fn serve(cfg: Config, mode: PracticeMode) -> Result<()> {
    let store = Arc::new(
        ProgressStore::open(&cfg.progress.store_path)
            .await
            .context("Failed to open progress store")?,
    );
    let session = build_session(&cfg, mode);
    let listener_task = spawn_progress_listener(Arc::clone(&store), session.subscribe());

    let app = create_router(AppState::new(session.clone(), store));
    let addr = format!("{}:{}", cfg.http.bind, cfg.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Downloads go to {}", cfg.export.download_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    session.dispose();
    listener_task.abort();
    Ok(())
}

async fn record(
    cfg: Config,
    seconds: u64,
    video: bool,
    audio: bool,
    mode: PracticeMode,
) -> Result<()> {
    let store = Arc::new(
        ProgressStore::open(&cfg.progress.store_path)
            .await
            .context("Failed to open progress store")?,
    );
    let session = build_session(&cfg, mode);
    let listener_task = spawn_progress_listener(Arc::clone(&store), session.subscribe());

    let constraints = MediaConstraints {
        video: video.then(Default::default),
        audio,
    };
    session.acquire(constraints).await?;
    session.start_recording()?;

    info!("Recording for {} seconds...", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    let recording = session.stop_recording().await?;
    let saved = session.download(recording.id).await?;
    session.dispose();

    info!("Saved {} ({} bytes)", saved.location, saved.bytes);
    println!("{}", saved.location);

    // Let the listener drain SessionCompleted before exiting
    drop(session);
    listener_task.await.context("Progress listener failed")?;

    if recording.mime_type == "audio/wav" {
        let info = WavInfo::open(&saved.location)?;
        info!(
            "{:.1}s at {}Hz, {} channel(s)",
            info.duration_seconds, info.sample_rate, info.channels
        );
    }

    Ok(())
}

async fn progress(cfg: Config, reset: bool) -> Result<()> {
    let store = ProgressStore::open(&cfg.progress.store_path)
        .await
        .context("Failed to open progress store")?;

    if reset {
        store.reset().await?;
    }

    let progress = store.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}
