//! Tidewatch Lifecycle - Cascade Engine
//!
//! Soft delete, cascade restore and hard delete for the
//! Project → Point → Deployment → Audio hierarchy and the Recorder registry.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidewatch_core::{LifecycleConfig, Tier};
//! use tidewatch_lifecycle::{spawn_cascade_worker, DispatcherConfig, LifecycleEngine};
//! use tidewatch_storage::{InMemoryBlobStore, InMemoryGateway};
//! use tokio::sync::watch;
//!
//! let gateway = Arc::new(InMemoryGateway::new());
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let (dispatcher, worker) =
//!     spawn_cascade_worker(gateway.clone(), DispatcherConfig::default(), shutdown_rx);
//!
//! let engine = LifecycleEngine::new(gateway, Arc::new(InMemoryBlobStore::new()), LifecycleConfig::default())?
//!     .with_dispatcher(dispatcher);
//!
//! engine.soft_delete(Tier::Project, project_id, actor_id).await?;
//!
//! let _ = shutdown_tx.send(true);
//! let metrics = worker.await?;
//! ```

pub mod dispatcher;
pub mod engine;
pub mod outcome;
pub mod purge;
pub mod recorder;
pub mod reservation;
pub mod restore;
pub mod soft_delete;
pub mod telemetry;
pub mod tiers;

pub use dispatcher::{
    apply_cascade_job, spawn_cascade_worker, CascadeDispatcher, CascadeMetrics,
    CascadeMetricsSnapshot, CascadeWorker, DispatcherConfig,
};
pub use engine::LifecycleEngine;
pub use outcome::{CascadeOutcome, PurgeReport, RestoreOutcome};
pub use recorder::{NewRecorder, RecorderUpdate};
pub use reservation::{ensure_available, ensure_not_active};
pub use telemetry::{init_tracing, DEFAULT_LOG_FILTER};
pub use tiers::{NewAudio, NewDeployment, NewPoint, NewProject, PointUpdate, ProjectUpdate};
