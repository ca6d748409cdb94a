//! Deferred Project → Audio cascade.
//!
//! A project soft delete writes a durable [`CascadeJob`] in the same
//! transaction as its synchronous tombstones. The worker applies jobs as
//! notifications arrive on a bounded channel, and sweeps the job table on an
//! interval so jobs survive restarts and dropped notifications.
//!
//! ```ignore
//! use tidewatch_lifecycle::{spawn_cascade_worker, DispatcherConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let (dispatcher, handle) =
//!     spawn_cascade_worker(gateway.clone(), DispatcherConfig::default(), shutdown_rx);
//! let engine = engine.with_dispatcher(dispatcher);
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tidewatch_core::constants::{
    DEFAULT_CASCADE_BATCH_SIZE, DEFAULT_CASCADE_CHANNEL_CAPACITY,
    DEFAULT_CASCADE_SWEEP_INTERVAL_SECS,
};
use tidewatch_core::{StorageError, Tier, TidewatchError, TidewatchResult};
use tidewatch_storage::{CascadeJob, PersistenceGateway, StateFilter, TierPredicate, WriteBatch};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the cascade worker.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How often to sweep the job table (default: 30 seconds)
    pub sweep_interval: Duration,

    /// Jobs fetched per sweep round (default: 16)
    pub batch_size: usize,

    /// Notification channel capacity (default: 256)
    pub channel_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(DEFAULT_CASCADE_SWEEP_INTERVAL_SECS),
            batch_size: DEFAULT_CASCADE_BATCH_SIZE,
            channel_capacity: DEFAULT_CASCADE_CHANNEL_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    /// Create DispatcherConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `TIDEWATCH_CASCADE_SWEEP_INTERVAL_SECS`: Sweep interval (default: 30)
    /// - `TIDEWATCH_CASCADE_BATCH_SIZE`: Jobs per sweep round (default: 16)
    /// - `TIDEWATCH_CASCADE_CHANNEL_CAPACITY`: Notification buffer (default: 256)
    pub fn from_env() -> Self {
        let sweep_interval = Duration::from_secs(
            std::env::var("TIDEWATCH_CASCADE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CASCADE_SWEEP_INTERVAL_SECS),
        );

        let batch_size = std::env::var("TIDEWATCH_CASCADE_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CASCADE_BATCH_SIZE)
            .max(1);

        let channel_capacity = std::env::var("TIDEWATCH_CASCADE_CHANNEL_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CASCADE_CHANNEL_CAPACITY)
            .max(1);

        Self {
            sweep_interval,
            batch_size,
            channel_capacity,
        }
    }

    /// Fast sweeps for local runs and tests.
    pub fn development() -> Self {
        Self {
            sweep_interval: Duration::from_secs(2),
            batch_size: 4,
            channel_capacity: 16,
        }
    }

    pub fn production() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            batch_size: 64,
            channel_capacity: 1024,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for cascade worker activity.
#[derive(Debug, Default)]
pub struct CascadeMetrics {
    /// Jobs applied by this worker
    pub jobs_applied: AtomicU64,

    /// Jobs found already completed elsewhere
    pub jobs_skipped: AtomicU64,

    /// Audio rows tombstoned by applied jobs
    pub audio_tombstoned: AtomicU64,

    /// Table sweeps completed
    pub sweep_cycles: AtomicU64,

    /// Errors applying or fetching jobs
    pub errors: AtomicU64,
}

impl CascadeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CascadeMetricsSnapshot {
        CascadeMetricsSnapshot {
            jobs_applied: self.jobs_applied.load(Ordering::Relaxed),
            jobs_skipped: self.jobs_skipped.load(Ordering::Relaxed),
            audio_tombstoned: self.audio_tombstoned.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of cascade metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeMetricsSnapshot {
    pub jobs_applied: u64,
    pub jobs_skipped: u64,
    pub audio_tombstoned: u64,
    pub sweep_cycles: u64,
    pub errors: u64,
}

// ============================================================================
// JOB APPLICATION
// ============================================================================

/// Apply one job: tombstone the project's active audio with the job's
/// stamp and retire the job, in one transaction.
///
/// Returns the number of audio rows tombstoned, or `None` if the job was
/// already completed by someone else.
pub async fn apply_cascade_job(
    gateway: &dyn PersistenceGateway,
    job: &CascadeJob,
) -> TidewatchResult<Option<u64>> {
    let mut batch = WriteBatch::new();
    batch.complete(job.id).tombstone(
        TierPredicate::under(Tier::Audio, Tier::Project, job.project_id)
            .with_state(StateFilter::Active),
        job.deletion,
    );

    match gateway.apply(&batch).await {
        Ok(outcomes) => Ok(Some(outcomes.get(1).map_or(0, |o| o.affected))),
        Err(TidewatchError::Storage(StorageError::CascadeJobMissing { .. })) => Ok(None),
        Err(e) => Err(e),
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Sending half of the worker's notification channel.
#[derive(Debug, Clone)]
pub struct CascadeDispatcher {
    tx: mpsc::Sender<CascadeJob>,
}

impl CascadeDispatcher {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<CascadeJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Hand a committed job to the worker without waiting.
    ///
    /// Returns `false` when the channel is full or closed; the job stays in
    /// the table for the next sweep.
    pub fn notify(&self, job: &CascadeJob) -> bool {
        match self.tx.try_send(*job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(job_id = %job.id, "Cascade channel full; job left for sweep");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(job_id = %job.id, "Cascade worker gone; job left for sweep");
                false
            }
        }
    }
}

// ============================================================================
// WORKER
// ============================================================================

/// Applies deferred project cascades.
pub struct CascadeWorker {
    gateway: Arc<dyn PersistenceGateway>,
    config: DispatcherConfig,
    metrics: Arc<CascadeMetrics>,
}

impl CascadeWorker {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, config: DispatcherConfig) -> Self {
        Self {
            gateway,
            config,
            metrics: Arc::new(CascadeMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<CascadeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Apply one job, recording the result. Returns whether it was applied.
    pub async fn apply(&self, job: &CascadeJob) -> bool {
        match apply_cascade_job(self.gateway.as_ref(), job).await {
            Ok(Some(tombstoned)) => {
                self.metrics.jobs_applied.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .audio_tombstoned
                    .fetch_add(tombstoned, Ordering::Relaxed);
                tracing::info!(
                    job_id = %job.id,
                    project_id = %job.project_id,
                    audio_tombstoned = tombstoned,
                    "Applied deferred project cascade"
                );
                true
            }
            Ok(None) => {
                self.metrics.jobs_skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(job_id = %job.id, "Cascade job already completed, skipping");
                false
            }
            Err(e) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    error = %e,
                    job_id = %job.id,
                    project_id = %job.project_id,
                    "Failed to apply cascade job"
                );
                false
            }
        }
    }

    /// Sweep the job table until it is empty or a round makes no progress.
    ///
    /// Returns the number of jobs applied.
    pub async fn process_pending(&self) -> u64 {
        self.metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
        let mut applied = 0u64;
        loop {
            let jobs = match self.gateway.pending_cascades(self.config.batch_size).await {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to fetch pending cascade jobs");
                    self.metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            };
            if jobs.is_empty() {
                break;
            }

            let mut progressed = false;
            for job in &jobs {
                if self.apply(job).await {
                    applied += 1;
                    progressed = true;
                }
            }
            if !progressed || jobs.len() < self.config.batch_size {
                break;
            }
        }

        if applied > 0 {
            tracing::info!(jobs = applied, "Cascade sweep completed");
        } else {
            tracing::trace!("Cascade sweep completed with no pending jobs");
        }
        applied
    }

    /// Run until the shutdown signal, then return the collected metrics.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<CascadeJob>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Arc<CascadeMetrics> {
        tracing::info!(
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Starting cascade worker"
        );

        let mut sweep = interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut channel_open = true;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Cascade worker shutting down");
                        break;
                    }
                }

                job = rx.recv(), if channel_open => match job {
                    Some(job) => {
                        self.apply(&job).await;
                    }
                    None => {
                        tracing::debug!("Cascade channel closed; continuing with sweeps only");
                        channel_open = false;
                    }
                },

                _ = sweep.tick() => {
                    self.process_pending().await;
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            jobs_applied = snapshot.jobs_applied,
            jobs_skipped = snapshot.jobs_skipped,
            audio_tombstoned = snapshot.audio_tombstoned,
            sweep_cycles = snapshot.sweep_cycles,
            errors = snapshot.errors,
            "Cascade worker completed"
        );

        self.metrics
    }
}

/// Spawn a worker on the current runtime and return its dispatcher.
pub fn spawn_cascade_worker(
    gateway: Arc<dyn PersistenceGateway>,
    config: DispatcherConfig,
    shutdown_rx: watch::Receiver<bool>,
) -> (CascadeDispatcher, JoinHandle<Arc<CascadeMetrics>>) {
    let (dispatcher, rx) = CascadeDispatcher::channel(config.channel_capacity);
    let worker = CascadeWorker::new(gateway, config);
    let handle = tokio::spawn(worker.run(rx, shutdown_rx));
    (dispatcher, handle)
}
