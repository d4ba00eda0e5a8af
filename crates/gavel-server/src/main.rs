use std::sync::Arc;

use clap::Parser;
use gavel_closer::{AuctionRepository, AuctionStore, CloserSettings, SqliteAuctionStore};
use gavel_core::{AuctionStatus, GavelConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the auction closer against a SQLite database until Ctrl-C.
#[derive(Debug, Parser)]
#[command(name = "gavel-server", version)]
struct Cli {
    /// Path to gavel.toml (defaults to ~/.gavel/gavel.toml).
    #[arg(long, env = "GAVEL_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gavel_server=info,gavel_closer=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = GavelConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        GavelConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    let store = SqliteAuctionStore::open(db_path)?;

    let collection = config.database.collection.clone();
    let active = store
        .count_by_status(&collection, AuctionStatus::Active)
        .await?;
    info!(%collection, active, "auction store ready");

    let interval = config.auction.interval_setting();
    let settings = CloserSettings::new(gavel_closer::interval::resolve_interval(
        interval.as_deref(),
    ))
    .with_timeout_setting(config.auction.timeout.as_deref());

    let shutdown = CancellationToken::new();
    let store: Arc<dyn AuctionStore> = Arc::new(store);
    let repo = AuctionRepository::with_settings(shutdown.clone(), store, collection, settings);
    info!(
        interval_secs = repo.interval().as_secs(),
        "gavel running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // signal the closer to stop, then wait for any in-flight sweep
    shutdown.cancel();
    repo.join_closer().await;
    info!("auction closer stopped");
    Ok(())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
