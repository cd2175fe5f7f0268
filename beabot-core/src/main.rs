//! BeaBot service - Main entry point
//!
//! Runs the bot core behind an HTTP command surface. The gateway sidecar
//! owning the chat-platform connection forwards commands and voice
//! notifications here and executes platform calls on the bot's behalf.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use beabot_common::config::{self, BotConfig};
use beabot_common::events::EventBus;
use beabot_core::acquisition::{AcquisitionPipeline, MusicLibrary, PlaylistStore, YtDlpResolver};
use beabot_core::api::{self, AppContext};
use beabot_core::gateway::HttpGateway;
use beabot_core::moderation::{ActionScheduler, ModerationService, WordFilter};
use beabot_core::{IdleReaper, Platform, SessionRegistry, SessionSettings};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for beabot
#[derive(Parser, Debug)]
#[command(name = "beabot")]
#[command(about = "Multi-workspace music and moderation bot")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "BEABOT_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP bind address (overrides config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Music library directory (overrides config)
    #[arg(short, long)]
    music_dir: Option<PathBuf>,

    /// Gateway sidecar base URL (overrides config)
    #[arg(short, long)]
    gateway_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config first so the configured level can seed the filter
    let mut config = config::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    apply_args(&mut config, &args);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &config.logging.level;
                format!("beabot={level},beabot_core={level},beabot_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting BeaBot v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match args.config.clone().or_else(config::default_config_path) {
        Some(path) if path.exists() => info!("Configuration: {}", path.display()),
        _ => info!("Configuration: compiled defaults"),
    }

    config.ensure_directories().context("Failed to create music directories")?;
    info!("Music library: {}", config.music.library_dir.display());

    let events = EventBus::default();

    let filter = Arc::new(
        WordFilter::load(&config.moderation.filter_file)
            .await
            .context("Failed to load word filter")?,
    );

    let library = Arc::new(MusicLibrary::new(&config.music.library_dir));
    if let Err(e) = library.scan().await {
        warn!("Initial library scan failed: {}", e);
    }

    let platform: Arc<dyn Platform> = Arc::new(
        HttpGateway::new(&config.gateway).context("Failed to create gateway client")?,
    );
    info!("Gateway: {}", config.gateway.base_url);

    let registry = Arc::new(SessionRegistry::new(
        Arc::clone(&platform),
        events.clone(),
        SessionSettings {
            max_queue_length: config.playback.max_queue_length,
            history_limit: config.playback.history_limit,
        },
    ));
    let pipeline = Arc::new(AcquisitionPipeline::new(
        Arc::clone(&library),
        Arc::new(YtDlpResolver::new(&config.acquisition)),
        config.download_dir(),
        config.acquisition.timeout(),
    ));
    let scheduler = Arc::new(ActionScheduler::new(
        Arc::clone(&platform),
        events.clone(),
        &config.scheduler,
    ));
    let moderation = Arc::new(ModerationService::new(
        Arc::clone(&platform),
        Arc::clone(&scheduler),
        events.clone(),
    ));

    // Background loops share one cancellation token
    let cancel = CancellationToken::new();
    let reaper = IdleReaper::new(
        Arc::clone(&registry),
        config.reaper.interval(),
        config.reaper.idle_threshold(),
    );
    let reaper_task = tokio::spawn(reaper.run(cancel.clone()));
    let scheduler_task = tokio::spawn(Arc::clone(&scheduler).run(cancel.clone()));

    let app = api::build_router(AppContext {
        registry: Arc::clone(&registry),
        pipeline,
        playlists: Arc::new(PlaylistStore::new(config.playlist_dir())),
        moderation,
        scheduler,
        filter,
        events,
    });

    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http.bind_addr))?;
    info!("Listening on http://{}", config.http.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("HTTP server stopped, draining background tasks");
    cancel.cancel();
    if let Err(e) = reaper_task.await {
        warn!("Idle reaper task failed: {}", e);
    }
    if let Err(e) = scheduler_task.await {
        warn!("Action scheduler task failed: {}", e);
    }
    registry.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Command-line overrides (highest priority)
fn apply_args(config: &mut BotConfig, args: &Args) {
    if let Some(ref bind) = args.bind {
        config.http.bind_addr = bind.clone();
    }
    if let Some(ref dir) = args.music_dir {
        config.music.library_dir = dir.clone();
    }
    if let Some(ref url) = args.gateway_url {
        config.gateway.base_url = url.clone();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
