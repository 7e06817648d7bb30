//! dub-pipeline - video dubbing job service
//!
//! Accepts dubbing jobs over HTTP, runs each through
//! download → transcribe → translate → synthesize → overlay,
//! and serves status, progress events and the final video.

use anyhow::{Context, Result};
use clap::Parser;
use dub_common::events::EventBus;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dub_pipeline::config::PipelineConfig;
use dub_pipeline::stages::StageSet;
use dub_pipeline::{AppState, PipelineOrchestrator, SessionRegistry, EVENT_BUS_CAPACITY};

/// Command-line arguments for dub-pipeline
#[derive(Parser, Debug)]
#[command(name = "dub-pipeline")]
#[command(about = "Video dubbing job service")]
#[command(version)]
struct Args {
    /// TOML config file (default: <config dir>/dubadub/dub-pipeline.toml)
    #[arg(short, long, env = "DUB_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "DUB_BIND_ADDRESS")]
    bind_address: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "DUB_PORT")]
    port: Option<u16>,

    /// Folder for per-session working files
    #[arg(short, long)]
    output_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = PipelineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting dub-pipeline v{}", env!("CARGO_PKG_VERSION"));

    let output_root = config.resolve_output_root(args.output_root.as_deref());
    tokio::fs::create_dir_all(&output_root)
        .await
        .with_context(|| format!("Failed to create output root {}", output_root.display()))?;
    info!("Output root: {}", output_root.display());

    let credentials = config.resolve_credentials();
    let stages = StageSet::from_config(&config, &credentials).context("Failed to set up stages")?;
    let policy = config.pipeline.stage_retry.clone();
    info!(
        max_retries = policy.max_retries,
        base_delay_ms = policy.base_delay.as_millis() as u64,
        "Stage retry policy"
    );

    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let registry = Arc::new(SessionRegistry::new());
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        stages,
        policy,
        event_bus.clone(),
        output_root,
    ));

    let shutdown = CancellationToken::new();
    let sweeper = dub_pipeline::spawn_retention_sweeper(
        registry.clone(),
        config.pipeline.retention(),
        shutdown.clone(),
    );

    let state = AppState::new(registry, orchestrator, event_bus);
    let tokens = state.cancellation_tokens.clone();
    let app = dub_pipeline::build_router(state);

    let bind_address = args.bind_address.unwrap_or(config.bind_address.clone());
    let port = args.port.unwrap_or(config.port);
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind_address, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down, cancelling running jobs");
    for token in tokens.read().await.values() {
        token.cancel();
    }
    shutdown.cancel();
    sweeper.await.ok();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
