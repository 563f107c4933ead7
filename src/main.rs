//! encounter-ledger server entry point.
//!
//! Starts the Axum HTTP server over PostgreSQL or in-memory storage.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use encounter_ledger::api;
use encounter_ledger::app_state::AppState;
use encounter_ledger::config::LedgerConfig;
use encounter_ledger::domain::scoring_tables;
use encounter_ledger::persistence::postgres::PgStore;
use encounter_ledger::service::OptimizerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = LedgerConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting encounter-ledger");

    scoring_tables::validate()?;

    // Build storage and service layer
    let app_state = if config.persistence_enabled {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await?;
        let store = PgStore::new(pool);
        if config.run_migrations {
            store.migrate().await?;
            tracing::info!("database migrations applied");
        }
        AppState::from_store(&config, Arc::new(store))
    } else {
        tracing::warn!("persistence disabled, using in-memory stores");
        AppState::in_memory(&config)
    };

    let pruner = spawn_cache_pruner(
        Arc::clone(&app_state.optimizer_service),
        config.cache_prune_interval_secs,
    );

    // Build router
    let app = api::build_app(app_state, &config);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = pruner {
        handle.abort();
    }
    tracing::info!("shutdown complete");
    Ok(())
}

/// Deletes expired optimization cache rows every `interval_secs` seconds.
/// Returns `None` when pruning is disabled.
fn spawn_cache_pruner(
    service: Arc<OptimizerService>,
    interval_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if interval_secs == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match service.prune_expired().await {
                Ok(0) => {}
                Ok(pruned) => tracing::info!(pruned, "expired optimization results pruned"),
                Err(err) => tracing::error!(error = ?err, "cache prune failed"),
            }
        }
    }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
