//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dance_api::{create_router, metrics, ApiConfig, AppState};
use dance_media::{check_ffmpeg, check_ffprobe, FfmpegBackend, VideoPipeline};
use dance_pose_client::{PoseServiceClient, RemotePoseDetectorFactory};
use dance_worker::{JobExecutor, RetentionSweeper, WorkerConfig};

const DEFAULT_LOG_FILTER: &str =
    "dance_api=info,dance_worker=info,dance_media=info,dance_pose_client=info";

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Starting dance-api");

    if let Err(e) = run().await {
        error!("Server error: {:#}", e);
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);
    info!("Worker config: {:?}", worker_config);

    let ffmpeg = check_ffmpeg().context("FFmpeg is required")?;
    let ffprobe = check_ffprobe().context("FFprobe is required")?;
    info!(ffmpeg = %ffmpeg.display(), ffprobe = %ffprobe.display(), "Found FFmpeg tools");

    let pose_client = Arc::new(PoseServiceClient::from_env().context("creating pose service client")?);
    match pose_client.health_check().await {
        Ok(true) => info!(url = %pose_client.config().base_url, "Pose service is healthy"),
        _ => warn!(
            url = %pose_client.config().base_url,
            "Pose service is not reachable yet; jobs will fail until it is"
        ),
    }

    let pipeline = VideoPipeline::new(
        Arc::new(FfmpegBackend::new()),
        Arc::new(RemotePoseDetectorFactory::new(pose_client)),
    );
    let executor = JobExecutor::new(worker_config, pipeline)
        .await
        .context("creating job executor")?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("installing Prometheus recorder")?)
    } else {
        None
    };

    let background = CancellationToken::new();
    let sweeper = RetentionSweeper::new(executor.clone());
    let sweeper_task = tokio::spawn(sweeper.run(background.clone()));

    let app = create_router(AppState::new(config.clone(), executor.clone()), metrics_handle);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_address()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    background.cancel();
    executor.shutdown().await;
    if let Err(e) = sweeper_task.await {
        warn!("Retention sweeper task ended abnormally: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
