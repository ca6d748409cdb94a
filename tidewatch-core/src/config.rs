//! Lifecycle engine configuration

use crate::constants::{
    DEFAULT_BLOB_BATCH_SIZE, DEFAULT_BLOB_TIMEOUT_SECS, DEFAULT_RESTORE_WINDOW_SECS,
    MAX_BLOB_BATCH_SIZE, MAX_RESTORE_WINDOW_SECS,
};
use crate::{ConfigError, TidewatchResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// How a restore decides which tombstoned descendants belong to the target's cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum RestoreMatch {
    /// `deleted_at` within `tolerance` of the target's stamp.
    TimeWindow {
        #[cfg_attr(feature = "openapi", schema(value_type = u64))]
        tolerance: Duration,
    },
    /// Same `cascade_group` as the target's tombstone.
    CascadeGroup,
}

impl Default for RestoreMatch {
    fn default() -> Self {
        RestoreMatch::TimeWindow {
            tolerance: Duration::from_secs(DEFAULT_RESTORE_WINDOW_SECS),
        }
    }
}

impl FromStr for RestoreMatch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "time-window" | "time_window" | "window" => Ok(RestoreMatch::default()),
            "cascade-group" | "cascade_group" | "group" => Ok(RestoreMatch::CascadeGroup),
            other => Err(ConfigError::InvalidValue {
                field: "restore_match".to_string(),
                value: other.to_string(),
                reason: "expected time-window or cascade-group".to_string(),
            }),
        }
    }
}

/// Tunables for the cascade engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Descendant matching policy for restore (default: 5 second window)
    pub restore_match: RestoreMatch,

    /// Keys per multi-object delete call, at most 1000 (default: 1000)
    pub blob_batch_size: usize,

    /// Bound on every blob store call (default: 30 seconds)
    #[serde(with = "duration_secs")]
    pub blob_timeout: Duration,

    /// Hand a project's audio tier to the cascade dispatcher instead of
    /// tombstoning it inline (default: true)
    pub defer_project_audio: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            restore_match: RestoreMatch::default(),
            blob_batch_size: DEFAULT_BLOB_BATCH_SIZE,
            blob_timeout: Duration::from_secs(DEFAULT_BLOB_TIMEOUT_SECS),
            defer_project_audio: true,
        }
    }
}

impl LifecycleConfig {
    /// Create LifecycleConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `TIDEWATCH_RESTORE_MATCH`: `time-window` or `cascade-group` (default: time-window)
    /// - `TIDEWATCH_RESTORE_WINDOW_SECS`: Window tolerance in seconds (default: 5)
    /// - `TIDEWATCH_BLOB_BATCH_SIZE`: Keys per delete batch, clamped to 1..=1000 (default: 1000)
    /// - `TIDEWATCH_BLOB_TIMEOUT_SECS`: Blob call timeout (default: 30)
    /// - `TIDEWATCH_DEFER_PROJECT_AUDIO`: Defer project audio cascade (default: true)
    pub fn from_env() -> Self {
        let tolerance = Duration::from_secs(
            std::env::var("TIDEWATCH_RESTORE_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RESTORE_WINDOW_SECS),
        );

        let restore_match = match std::env::var("TIDEWATCH_RESTORE_MATCH")
            .ok()
            .and_then(|s| s.parse::<RestoreMatch>().ok())
        {
            Some(RestoreMatch::CascadeGroup) => RestoreMatch::CascadeGroup,
            _ => RestoreMatch::TimeWindow { tolerance },
        };

        let blob_batch_size = std::env::var("TIDEWATCH_BLOB_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_BLOB_BATCH_SIZE)
            .clamp(1, MAX_BLOB_BATCH_SIZE);

        let blob_timeout = Duration::from_secs(
            std::env::var("TIDEWATCH_BLOB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BLOB_TIMEOUT_SECS),
        );

        let defer_project_audio = std::env::var("TIDEWATCH_DEFER_PROJECT_AUDIO")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            restore_match,
            blob_batch_size,
            blob_timeout,
            defer_project_audio,
        }
    }

    /// Small batches and short timeouts for local runs against MinIO.
    pub fn development() -> Self {
        Self {
            blob_batch_size: 100,
            blob_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Production settings: full batches and grouped restore.
    pub fn production() -> Self {
        Self {
            restore_match: RestoreMatch::CascadeGroup,
            blob_timeout: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Tolerance to use when matching by time window.
    pub fn restore_window(&self) -> Option<Duration> {
        match self.restore_match {
            RestoreMatch::TimeWindow { tolerance } => Some(tolerance),
            RestoreMatch::CascadeGroup => None,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> TidewatchResult<()> {
        if let Some(tolerance) = self.restore_window() {
            if tolerance > Duration::from_secs(MAX_RESTORE_WINDOW_SECS) {
                return Err(ConfigError::InvalidValue {
                    field: "restore_match".to_string(),
                    value: format!("{:?}", tolerance),
                    reason: format!(
                        "restore window tolerance must be at most {} seconds",
                        MAX_RESTORE_WINDOW_SECS
                    ),
                }
                .into());
            }
        }

        if self.blob_batch_size == 0 || self.blob_batch_size > MAX_BLOB_BATCH_SIZE {
            return Err(ConfigError::InvalidValue {
                field: "blob_batch_size".to_string(),
                value: self.blob_batch_size.to_string(),
                reason: format!("blob_batch_size must be between 1 and {}", MAX_BLOB_BATCH_SIZE),
            }
            .into());
        }

        if self.blob_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "blob_timeout".to_string(),
                value: format!("{:?}", self.blob_timeout),
                reason: "blob_timeout must be positive".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
