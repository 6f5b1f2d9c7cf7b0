//! ntrp-coach - tennis NTRP assessment service
//!
//! # Usage
//!
//! ```bash
//! # HTTP server on 0.0.0.0:5001 (pose-based analysis needs the `onnx` feature)
//! cargo run --release --features onnx
//!
//! # Assess one local video and print the result
//! ./ntrp-coach analyze serve.mp4 --strategy direct_video
//! ```
//!
//! # Environment Variables
//!
//! - `GOOGLE_API_KEY`: reasoning service key (may live in `.env`)
//! - `NTRP_CONFIG`: path to a TOML config file
//! - `NTRP_CORS_ORIGINS`: comma-separated origins allowed by CORS
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ntrp_coach::api::{create_app, AppState};
use ntrp_coach::config::{AppConfig, SamplingConfig};
use ntrp_coach::{
    AnalysisOrchestrator, FfmpegDecoder, GeminiClient, PoseModel, Strategy, UploadStore,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "ntrp-coach")]
#[command(about = "Tennis NTRP assessment from video")]
#[command(version)]
struct CliArgs {
    /// Config file (default: $NTRP_CONFIG, then ./ntrp_config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:5001")
    #[arg(short, long, env = "NTRP_ADDR")]
    addr: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the HTTP server (default)
    Serve,

    /// Analyze one local video file and print the raw result
    Analyze {
        /// Video file to assess
        file: PathBuf,
        /// direct_video or pose_based (default from config)
        #[arg(long)]
        strategy: Option<Strategy>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

// ============================================================================
// Wiring
// ============================================================================

#[cfg(feature = "onnx")]
fn pose_model(config: &SamplingConfig) -> Option<Arc<dyn PoseModel>> {
    if config.model_path.exists() {
        info!(path = %config.model_path.display(), "Pose model found");
        Some(Arc::new(ntrp_coach::pose::BlazePoseModel::from_config(config)))
    } else {
        warn!(
            path = %config.model_path.display(),
            "Pose model file not found; pose_based analysis disabled"
        );
        None
    }
}

#[cfg(not(feature = "onnx"))]
fn pose_model(_config: &SamplingConfig) -> Option<Arc<dyn PoseModel>> {
    warn!("Built without the `onnx` feature; pose_based analysis disabled");
    None
}

/// Returns the orchestrator and whether API credentials were found.
fn build_orchestrator(config: Arc<AppConfig>) -> Result<(Arc<AnalysisOrchestrator>, bool)> {
    let gemini = Arc::new(
        GeminiClient::from_config(&config.reasoning).context("Failed to build Gemini client")?,
    );
    let has_key = gemini.has_credentials();
    if !has_key {
        warn!(
            env = %config.reasoning.api_key_env,
            "No reasoning API key found; analyses will fail until it is set"
        );
    }

    let pose = pose_model(&config.sampling);
    if pose.is_none() && config.analysis.strategy == Strategy::PoseBased {
        warn!("Default strategy is pose_based but no pose model is available");
    }

    let orchestrator = AnalysisOrchestrator::new(
        Arc::clone(&config),
        gemini.clone(),
        gemini,
        Arc::new(FfmpegDecoder::from_config(&config.sampling)),
        pose,
    );
    Ok((Arc::new(orchestrator), has_key))
}

/// Cancel `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        token.cancel();
    });
}

// ============================================================================
// Commands
// ============================================================================

async fn serve(orchestrator: Arc<AnalysisOrchestrator>, has_key: bool) -> Result<()> {
    let config = orchestrator.config();
    let addr = config.server.addr.clone();
    info!(
        addr = %addr,
        model = %config.reasoning.model,
        default_strategy = %config.analysis.strategy,
        upload_dir = %config.server.upload_dir.display(),
        "Starting ntrp-coach"
    );

    let shutdown = CancellationToken::new();
    cancel_on_ctrl_c(shutdown.clone());

    let app = create_app(AppState::new(orchestrator, shutdown.clone(), has_key));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            info!("HTTP server received shutdown signal");
        })
        .await
        .context("HTTP server error")?;

    info!("Graceful shutdown complete");
    Ok(())
}

async fn analyze_file(
    orchestrator: Arc<AnalysisOrchestrator>,
    file: PathBuf,
    strategy: Option<Strategy>,
) -> Result<()> {
    let strategy = strategy.unwrap_or(orchestrator.config().analysis.strategy);
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Work on a staged copy so the caller's file is never deleted.
    let store = UploadStore::new(&orchestrator.config().server.upload_dir);
    let (video, mut staged) = store
        .create(&name)
        .await
        .context("Failed to stage video")?;
    let mut source = tokio::fs::File::open(&file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    tokio::io::copy(&mut source, &mut staged)
        .await
        .context("Failed to copy video into upload directory")?;
    staged
        .flush()
        .await
        .context("Failed to copy video into upload directory")?;
    drop(staged);

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let result = orchestrator
        .analyze(video, strategy, cancel)
        .await
        .with_context(|| format!("Analysis of {} failed", file.display()))?;
    println!("{}", result.as_str());
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load().context("Failed to load configuration")?,
    };
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }

    let (orchestrator, has_key) = build_orchestrator(Arc::new(config))?;

    match args.command.unwrap_or(SubCommand::Serve) {
        SubCommand::Serve => serve(orchestrator, has_key).await,
        SubCommand::Analyze { file, strategy } => analyze_file(orchestrator, file, strategy).await,
    }
}
