//! geoalert - geofence alert core for a personal-safety companion
//!
//! Module structure:
//! - `domain/` - Core types (Position, GeofenceDefinition, ZoneState, errors)
//! - `io/` - Platform collaborators (location sources, persistence, actions, notifier)
//! - `services/` - Pipeline (sampler, evaluator, status store, alert bus, router, service)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::{Parser, Subcommand};
use geoalert::domain::{GeoResult, Position};
use geoalert::infra::{Config, Metrics};
use geoalert::io::{
    spawn_notifier, status_message, ChannelLocationSource, FilePersistence, LoggingActionSink,
    Persistence, ReplayLocationSource,
};
use geoalert::services::{CommandRouter, GeofenceService, ProfileStore, StatusStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// geoalert - safe zone monitoring and voice-triggered emergency actions
#[derive(Parser, Debug)]
#[command(name = "geoalert", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/dev.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Monitor the fence over the simulated route until Ctrl+C (default)
    Run,
    /// Route a spoken phrase and perform its action
    Say {
        phrase: String,
        /// Current latitude, used by the "lost" action
        #[arg(long, requires = "lng", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Current longitude, used by the "lost" action
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lng: Option<f64>,
    },
    /// Print the last persisted status
    Status,
    /// Save the emergency profile
    Profile {
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        contact: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default: INFO, use RUST_LOG=debug for per-fix visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);
    let persistence: Arc<dyn Persistence> = Arc::new(FilePersistence::open(config.store_path()));

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config, persistence).await,
        Command::Say { phrase, lat, lng } => {
            let position = lat.zip(lng).map(|(lat, lng)| Position::now(lat, lng));
            say(persistence, &phrase, position).await
        }
        Command::Status => {
            let status = StatusStore::open(persistence).get();
            println!("{}", status_message(status));
            Ok(())
        }
        Command::Profile { name, address, contact } => {
            ProfileStore::new(persistence)
                .save(&name, &address, &contact)
                .context("Failed to save profile")?;
            info!(name = %name, "profile_saved");
            Ok(())
        }
    }
}

async fn run(config: Config, persistence: Arc<dyn Persistence>) -> anyhow::Result<()> {
    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "geoalert starting");
    info!(
        config_file = %config.config_file(),
        device_id = %config.device_id(),
        sampler_interval_ms = %config.sampler_interval_ms(),
        fence_id = %config.fence_id(),
        fence_radius_m = %config.fence_radius_m(),
        store_path = %config.store_path(),
        route_points = %config.simulation_route().len(),
        "config_loaded"
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());
    let source = Arc::new(
        ReplayLocationSource::new(config.simulation_route().iter().map(|p| (p[0], p[1])))
            .with_interval(Duration::from_millis(config.simulation_interval_ms())),
    );
    let service = GeofenceService::new(&config, source, persistence, metrics.clone());
    info!(status = %service.status(), "last_known_status");

    // Start notifier before activation so the first transition is seen
    let subscription = service.subscribe();
    let notifier_id = subscription.id();
    let notifier = spawn_notifier(subscription, service.status_store());

    // Start metrics reporter (lock-free reads)
    let metrics_interval = config.metrics_interval_secs();
    let mut reporter_shutdown = shutdown_rx.clone();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => metrics.report().log(),
                _ = reporter_shutdown.changed() => break,
            }
        }
        metrics.report().log();
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let mut activation_shutdown = shutdown_rx.clone();
    tokio::select! {
        result = activate_fence(&service, &config) => {
            if let Err(e) = result {
                error!(error = %e, message = %e.status_message(), "fence_activation_failed");
            }
        }
        _ = activation_shutdown.wait_for(|stop| *stop) => {}
    }
    let _ = shutdown_rx.wait_for(|stop| *stop).await;

    // Keep the persisted fence so the next run restores it
    service.shutdown();
    service.unsubscribe(notifier_id);
    let notifications = notifier.await.unwrap_or_default();
    let _ = reporter.await;

    info!(notifications = %notifications, final_status = %service.status(), "geoalert shutdown complete");
    Ok(())
}

/// Restore the fence from the previous run, else activate the configured one
async fn activate_fence(service: &GeofenceService, config: &Config) -> GeoResult<()> {
    if let Some(fence) = service.restore().await? {
        info!(fence_id = %fence.id, "fence_restored");
        return Ok(());
    }
    match config.fence() {
        Some(fence) => service.activate(fence).await,
        None => {
            warn!("no_fence_configured");
            Ok(())
        }
    }
}

async fn say(persistence: Arc<dyn Persistence>, phrase: &str, position: Option<Position>) -> anyhow::Result<()> {
    let source = Arc::new(ChannelLocationSource::new());
    if let Some(position) = position {
        source.push(position).await;
    }

    let sink = Arc::new(LoggingActionSink::new(ProfileStore::new(persistence), source));
    let router = CommandRouter::new(sink, Arc::new(Metrics::new()));

    let intent = CommandRouter::route(phrase);
    println!("{}", intent.spoken_response());
    if let Err(e) = router.dispatch(intent).await {
        eprintln!("{}", e.status_message());
        return Err(e.into());
    }
    Ok(())
}
