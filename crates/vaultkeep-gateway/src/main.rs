use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vaultkeep_core::{config::VaultkeepConfig, Settings};
use vaultkeep_restic::ResticExecutor;
use vaultkeep_scheduler::{status_channel, LastRunSink, SchedulerEngine};

mod app;
mod http;
mod ws;

use ws::{feed::StatusFeed, hub::Hub};

const DEFAULT_LOG_FILTER: &str = "vaultkeep_gateway=info,vaultkeep_scheduler=info,tower_http=debug";

#[derive(Parser)]
#[command(name = "vaultkeep-gateway")]
#[command(version)]
#[command(about = "Backup scheduler daemon with a live status channel")]
struct Cli {
    /// Configuration file path (falls back to $VAULTKEEP_CONFIG, then ~/.vaultkeep/vaultkeep.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log filter directive, replaces the built-in default
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // config: --config > VAULTKEEP_CONFIG > ~/.vaultkeep/vaultkeep.toml
    let config_path = cli
        .config
        .or_else(|| std::env::var("VAULTKEEP_CONFIG").ok());
    let config = VaultkeepConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({e}), using defaults");
        VaultkeepConfig::default()
    });

    ensure_parent_dir(&config.settings.path);
    let settings = Arc::new(
        Settings::load(&config.settings.path)
            .with_context(|| format!("loading settings from {}", config.settings.path))?,
    );

    let (emitter, receivers) = status_channel();
    let executor = Arc::new(ResticExecutor::new(
        &config.restic.binary,
        Arc::clone(&settings),
    ));
    let last_runs: Arc<dyn LastRunSink> = settings.clone();
    let engine = SchedulerEngine::new(
        executor,
        emitter,
        Some(last_runs),
        config.scheduler.max_concurrent_runs,
    );
    engine.rebuild_schedule(&settings.config().schedules);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (hub, hub_handle) = Hub::new(
        Duration::from_millis(config.viewer.sweep_interval_ms.max(1)),
        Duration::from_millis(config.viewer.liveness_timeout_ms),
    );
    tokio::spawn(hub.run(shutdown_rx));

    let feed = StatusFeed::new();
    tokio::spawn(feed.clone().relay(receivers));

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(
        config,
        settings,
        engine.clone(),
        hub_handle,
        feed,
    ));
    let router = app::build_router(state);

    info!("Vaultkeep gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Stopping the hub closes every viewer session, so open sockets do not
    // hold the graceful shutdown open.
    let stop = async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
        engine.shutdown();
    };
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(stop)
    .await?;

    info!("Vaultkeep gateway stopped");
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), "could not create settings directory: {e}");
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
