mod api;
mod config;
mod db;
mod error;
mod history;
mod ingest;
mod provider;
mod ranker;
mod scheduler;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::SnapshotStore;
use crate::error::Result;
use crate::provider::ProviderGateway;
use crate::scheduler::SnapshotScheduler;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let store = SnapshotStore::open(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Provider ---
    let gateway = Arc::new(ProviderGateway::new(&cfg)?);
    if cfg.provider_token.is_none() {
        warn!("PROVIDER_TOKEN not set: ingestion requests will be rejected until it is configured");
    }

    let health = Arc::new(HealthState::new());

    // --- Scheduled snapshots (optional) ---
    if cfg.snapshot_interval_secs > 0 {
        let scheduler = SnapshotScheduler::new(
            Arc::clone(&gateway),
            store.clone(),
            Arc::clone(&health),
            Duration::from_secs(cfg.snapshot_interval_secs),
        );
        tokio::spawn(async move { scheduler.run().await });
    }

    // --- HTTP API server ---
    let app = router(ApiState {
        store: store.clone(),
        gateway,
        health,
    });
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
