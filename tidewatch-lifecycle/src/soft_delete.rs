//! Soft delete with downward cascade.

use crate::engine::LifecycleEngine;
use crate::outcome::CascadeOutcome;
use tidewatch_core::{ActorId, Deletion, EntityId, LifecycleError, Tier, TidewatchResult};
use tidewatch_storage::{CascadeJob, StateFilter, TierCounts, TierPredicate, WriteBatch, WriteOp};
use tracing::instrument;

impl LifecycleEngine {
    /// Tombstone an active row and every active descendant with one stamp.
    ///
    /// Project targets hand their audio tier to the dispatcher as a durable
    /// job written in the same transaction, unless deferral is disabled.
    /// Descendants that were already deleted keep their own tombstone.
    #[instrument(skip(self), fields(tier = %tier, id = %id))]
    pub async fn soft_delete(
        &self,
        tier: Tier,
        id: EntityId,
        actor: ActorId,
    ) -> TidewatchResult<CascadeOutcome> {
        if self.gateway.find_active(tier, id).await?.is_none() {
            return Err(LifecycleError::NotFound { tier, id }.into());
        }

        let deletion = Deletion::new(self.now(), actor);
        let mut batch = WriteBatch::new();
        batch.tombstone(
            TierPredicate::row(tier, id).with_state(StateFilter::Active),
            deletion,
        );

        let mut deferred_job = None;
        for below in tier.descendants() {
            if tier == Tier::Project && *below == Tier::Audio && self.config.defer_project_audio {
                let job = CascadeJob::new(id, deletion, deletion.deleted_at);
                batch.enqueue(job);
                deferred_job = Some(job);
                continue;
            }
            batch.tombstone(
                TierPredicate::under(*below, tier, id).with_state(StateFilter::Active),
                deletion,
            );
        }

        let outcomes = self.gateway.apply(&batch).await?;
        if outcomes.first().map_or(0, |o| o.affected) == 0 {
            tracing::warn!(
                tier = %tier,
                id = %id,
                "Target was deleted concurrently; descendants carry this cascade's stamp"
            );
        }

        let mut affected = TierCounts::default();
        for (op, outcome) in batch.ops().iter().zip(&outcomes) {
            if let WriteOp::Update { predicate, .. } = op {
                affected.add(predicate.tier, outcome.affected);
            }
        }

        if let Some(job) = &deferred_job {
            self.notify(job);
        }

        let snapshot = self.get_any(tier, id).await?;
        tracing::info!(
            tier = %tier,
            id = %id,
            actor = %actor,
            cascade_group = %deletion.cascade_group,
            rows = affected.total(),
            deferred = deferred_job.is_some(),
            "Soft delete committed"
        );

        Ok(CascadeOutcome {
            snapshot,
            affected,
            deferred_job,
        })
    }
}
