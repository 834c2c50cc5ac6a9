//! PROPBET: live prop bet resolution engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the provider, store and engine together, restores queue state
//! from storage and runs until Ctrl+C.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use propbet::api::{self, routes::ApiState};
use propbet::clock::{Clock, SystemClock};
use propbet::config::{self, StorageBackend};
use propbet::data::breaker::CircuitBreaker;
use propbet::data::espn::EspnProvider;
use propbet::data::fetcher::SnapshotFetcher;
use propbet::data::SnapshotProvider;
use propbet::engine::SettlementEngine;
use propbet::metrics::Metrics;
use propbet::modes::ModeRegistry;
use propbet::storage::{BetStore, MemoryStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("PROPBET_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = if std::path::Path::new(&config_path).exists() {
        config::AppConfig::load(&config_path)?
    } else {
        config::AppConfig::default()
    };

    init_logging();

    info!(
        config = %config_path,
        provider = %cfg.provider.name,
        storage = ?cfg.storage.backend,
        workers = cfg.engine.max_workers,
        "PROPBET starting up"
    );

    // -- Initialise components -------------------------------------------

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new(&cfg.metrics.namespace));

    let provider: Arc<dyn SnapshotProvider> = match cfg.provider.name.as_str() {
        "espn" => Arc::new(EspnProvider::new(cfg.provider.base_url.clone())?),
        other => bail!("Unknown stats provider '{other}'"),
    };

    let breaker = Arc::new(CircuitBreaker::new(
        provider.name(),
        cfg.breaker_config(),
        clock.clone(),
    ));
    let fetcher = Arc::new(SnapshotFetcher::new(
        provider,
        breaker,
        clock.clone(),
        metrics.clone(),
        cfg.fetcher_config(),
    ));

    let store: Arc<dyn BetStore> = match cfg.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage; bets are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StorageBackend::Sqlite => Arc::new(
            SqliteStore::connect(&cfg.storage.url)
                .await
                .context("Failed to open bet store")?,
        ),
    };

    let registry = Arc::new(ModeRegistry::standard());
    info!(modes = registry.len(), "Game modes registered");

    let engine = Arc::new(SettlementEngine::new(
        registry,
        store,
        fetcher,
        clock,
        metrics,
        cfg.engine_config(),
    ));

    // -- Restore queue state -----------------------------------------------

    engine
        .recover()
        .await
        .context("Failed to recover engine state")?;

    // -- HTTP API ----------------------------------------------------------

    if cfg.server.enabled {
        api::spawn_server(Arc::new(ApiState::new(engine.clone())), &cfg.server.bind).await?;
    }

    // -- Main loop ---------------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = tokio::spawn(engine.clone().run(shutdown_rx));

    info!("Engine running. Press Ctrl+C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received.");

    let _ = shutdown_tx.send(true);
    if let Err(e) = runner.await {
        error!(error = %e, "Engine task ended abnormally");
    }

    let status = engine.status();
    info!(
        queued = status.resolution_queue_depth,
        lifecycle = status.lifecycle_queue_depth,
        "PROPBET shut down cleanly."
    );
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("propbet=info"));

    let json_logging = std::env::var("PROPBET_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
