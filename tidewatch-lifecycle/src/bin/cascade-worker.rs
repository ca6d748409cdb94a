//! Standalone deferred-cascade worker.
//!
//! Sweeps the cascade job table of a PostgreSQL database until Ctrl-C.
//! Connection settings come from the `TIDEWATCH_DB_*` variables and sweep
//! settings from `TIDEWATCH_CASCADE_*`.

use std::sync::Arc;
use tidewatch_lifecycle::{init_tracing, spawn_cascade_worker, DispatcherConfig, DEFAULT_LOG_FILTER};
use tidewatch_storage::{DbConfig, PersistenceGateway, PgGateway};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(DEFAULT_LOG_FILTER)?;

    let db_config = DbConfig::from_env();
    let gateway = PgGateway::from_config(&db_config)?;

    if std::env::var("TIDEWATCH_DB_MIGRATE")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
    {
        gateway.migrate().await?;
        tracing::info!("Schema applied");
    }

    if !gateway.health_check().await? {
        return Err("database health check failed".into());
    }

    let config = DispatcherConfig::from_env();
    tracing::info!(
        host = %db_config.host,
        dbname = %db_config.dbname,
        pool_size = db_config.max_size,
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Cascade worker connected"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    // Held so the worker keeps listening; nothing in this process notifies.
    let (_dispatcher, handle) = spawn_cascade_worker(Arc::new(gateway), config, shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    let metrics = handle.await?;
    let snapshot = metrics.snapshot();
    tracing::info!(
        jobs_applied = snapshot.jobs_applied,
        audio_tombstoned = snapshot.audio_tombstoned,
        errors = snapshot.errors,
        "Cascade worker exited"
    );
    Ok(())
}
