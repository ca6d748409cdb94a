//! Structured logging setup for binaries.

use tidewatch_core::{ConfigError, TidewatchResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "tidewatch_lifecycle=debug,tidewatch_storage=info,info";

/// Install a JSON `tracing` subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_filter` when `RUST_LOG` is unset or invalid.
/// Fails if a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> TidewatchResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            field: "tracing".to_string(),
            value: default_filter.to_string(),
            reason: format!("Failed to init subscriber: {}", e),
        })?;

    tracing::info!(filter = default_filter, "Telemetry initialized");
    Ok(())
}
