//! The lifecycle engine and the plumbing its operations share.
//!
//! Operations live in their own modules as `impl LifecycleEngine` blocks:
//! [`crate::tiers`] and [`crate::recorder`] for creates and updates,
//! [`crate::soft_delete`], [`crate::restore`] and [`crate::purge`] for the
//! cascades.

use crate::dispatcher::{apply_cascade_job, CascadeDispatcher};
use std::future::Future;
use std::sync::Arc;
use tidewatch_core::{
    BlobError, Clock, EntityId, LifecycleConfig, LifecycleError, Record, SystemClock, Tier,
    TidewatchResult, Timestamp,
};
use tidewatch_storage::{BlobStore, CascadeJob, Page, PersistenceGateway};

/// Cascade engine over a persistence gateway and a blob store.
///
/// Cheap to clone; every collaborator is behind an `Arc`.
#[derive(Clone)]
pub struct LifecycleEngine {
    pub(crate) gateway: Arc<dyn PersistenceGateway>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    pub(crate) config: LifecycleConfig,
    dispatcher: Option<CascadeDispatcher>,
}

impl std::fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .field("dispatcher", &self.dispatcher.is_some())
            .finish_non_exhaustive()
    }
}

impl LifecycleEngine {
    /// Create an engine with the wall clock and no dispatcher.
    ///
    /// Without a dispatcher, deferred project cascades stay pending until a
    /// [`crate::CascadeWorker`] sweep or a restore drains them.
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        blobs: Arc<dyn BlobStore>,
        config: LifecycleConfig,
    ) -> TidewatchResult<Self> {
        config.validate()?;
        Ok(Self {
            gateway,
            blobs,
            clock: Arc::new(SystemClock),
            config,
            dispatcher: None,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: CascadeDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Wake the worker for a job that is already committed.
    pub(crate) fn notify(&self, job: &CascadeJob) {
        match &self.dispatcher {
            Some(dispatcher) => {
                dispatcher.notify(job);
            }
            None => tracing::debug!(
                job_id = %job.id,
                project_id = %job.project_id,
                "No dispatcher attached; cascade job left for the next sweep"
            ),
        }
    }

    /// Run a blob call under the configured timeout.
    pub(crate) async fn blob_call<F>(&self, bucket: &str, call: F) -> Result<(), BlobError>
    where
        F: Future<Output = Result<(), BlobError>>,
    {
        match tokio::time::timeout(self.config.blob_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(BlobError::Timeout {
                bucket: bucket.to_string(),
                after: self.config.blob_timeout,
            }),
        }
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Active row, or `NotFound`.
    pub async fn get_active(&self, tier: Tier, id: EntityId) -> TidewatchResult<Record> {
        self.gateway
            .find_active(tier, id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound { tier, id }.into())
    }

    /// Row in any lifecycle state, or `NotFound`.
    pub async fn get_any(&self, tier: Tier, id: EntityId) -> TidewatchResult<Record> {
        self.gateway
            .find_any(tier, id)
            .await?
            .ok_or_else(|| LifecycleError::NotFound { tier, id }.into())
    }

    pub async fn list_active(
        &self,
        tier: Tier,
        parent: Option<EntityId>,
        page: Page,
    ) -> TidewatchResult<Vec<Record>> {
        self.gateway.list_active(tier, parent, page).await
    }

    /// Apply every pending deferred cascade of a project inline.
    ///
    /// Returns the number of audio rows tombstoned. Jobs a worker finished
    /// concurrently are skipped.
    pub async fn drain_pending(&self, project_id: EntityId) -> TidewatchResult<u64> {
        let jobs = self.gateway.pending_cascades_for(project_id).await?;
        let mut tombstoned = 0;
        for job in &jobs {
            if let Some(affected) = apply_cascade_job(self.gateway.as_ref(), job).await? {
                tombstoned += affected;
            }
        }
        if !jobs.is_empty() {
            tracing::info!(
                project_id = %project_id,
                jobs = jobs.len(),
                audio_tombstoned = tombstoned,
                "Drained pending project cascades inline"
            );
        }
        Ok(tombstoned)
    }
}
