//! Hard delete: blobs first (best effort), then rows, leaves first.

use crate::engine::LifecycleEngine;
use crate::outcome::PurgeReport;
use tidewatch_core::constants::MAX_BLOB_BATCH_SIZE;
use tidewatch_core::{EntityId, LifecycleError, Record, Tier, TidewatchResult};
use tidewatch_storage::{PurgePlan, TierPredicate};
use tracing::instrument;

impl LifecycleEngine {
    /// Permanently remove a row and its subtree, active or deleted.
    ///
    /// Audio objects are deleted from the project bucket before any row goes.
    /// Blob failures are logged and counted in the report but never stop the
    /// relational delete. Recorders are refused while any deployment, active
    /// or deleted, still references them.
    #[instrument(skip(self), fields(tier = %tier, id = %id))]
    pub async fn hard_delete(&self, tier: Tier, id: EntityId) -> TidewatchResult<PurgeReport> {
        let target = self.get_any(tier, id).await?;

        if tier == Tier::Recorder {
            return self.purge_recorder(id).await;
        }

        let mut report = PurgeReport::default();
        match self.gateway.owning_project(tier, id).await? {
            Some(project) => {
                let bucket = project.bucket();
                match &target {
                    Record::Audio(audio) => {
                        self.delete_single_blob(bucket, &audio.object_key, &mut report)
                            .await
                    }
                    _ => {
                        let keys = self
                            .gateway
                            .object_keys(&TierPredicate::under(Tier::Audio, tier, id))
                            .await?;
                        self.delete_blob_batches(bucket, &keys, &mut report).await;
                    }
                }

                if tier == Tier::Project {
                    match self.blob_call(bucket, self.blobs.delete_bucket(bucket)).await {
                        Ok(()) => report.bucket_removed = true,
                        Err(e) => tracing::warn!(
                            project_id = %id,
                            bucket = %bucket,
                            error = %e,
                            "Failed to delete project bucket"
                        ),
                    }
                }
            }
            None => tracing::warn!(
                tier = %tier,
                id = %id,
                "No owning project resolved; skipping blob cleanup"
            ),
        }

        report.removed = self.gateway.purge(&PurgePlan::for_target(tier, id)).await?;
        report.deleted_leaf_count = report.removed.audio;

        tracing::info!(
            tier = %tier,
            id = %id,
            rows = report.removed.total(),
            audio = report.deleted_leaf_count,
            blob_batches = report.blob_batches,
            failed_blob_batches = report.failed_blob_batches,
            failed_blob_keys = report.failed_blob_keys,
            "Hard delete committed"
        );
        Ok(report)
    }

    async fn purge_recorder(&self, id: EntityId) -> TidewatchResult<PurgeReport> {
        let references = self.gateway.recorder_references(id).await?;
        if references.total() > 0 {
            return Err(LifecycleError::ReferentialBlock {
                recorder_id: id,
                count: references.active,
                tombstoned: references.tombstoned,
            }
            .into());
        }

        let removed = self
            .gateway
            .purge(&PurgePlan::for_target(Tier::Recorder, id))
            .await?;
        tracing::info!(recorder_id = %id, "Recorder permanently deleted");
        Ok(PurgeReport {
            removed,
            ..PurgeReport::default()
        })
    }

    async fn delete_single_blob(&self, bucket: &str, key: &str, report: &mut PurgeReport) {
        report.blob_batches += 1;
        if let Err(e) = self
            .blob_call(bucket, self.blobs.delete_object(bucket, key))
            .await
        {
            report.failed_blob_batches += 1;
            report.failed_blob_keys += 1;
            tracing::warn!(bucket = %bucket, key = %key, error = %e, "Failed to delete audio object");
        }
    }

    /// Multi-object deletes in chunks of at most 1000 keys.
    async fn delete_blob_batches(&self, bucket: &str, keys: &[String], report: &mut PurgeReport) {
        let chunk_size = self.config.blob_batch_size.clamp(1, MAX_BLOB_BATCH_SIZE);
        for chunk in keys.chunks(chunk_size) {
            report.blob_batches += 1;
            if let Err(e) = self
                .blob_call(bucket, self.blobs.delete_objects(bucket, chunk))
                .await
            {
                report.failed_blob_batches += 1;
                report.failed_blob_keys += chunk.len();
                tracing::warn!(
                    bucket = %bucket,
                    keys = chunk.len(),
                    first_key = chunk.first().map(String::as_str).unwrap_or_default(),
                    error = %e,
                    "Failed to delete audio object batch"
                );
            }
        }
    }
}
