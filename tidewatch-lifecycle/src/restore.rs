//! Cascade restore.

use crate::engine::LifecycleEngine;
use crate::outcome::RestoreOutcome;
use crate::reservation::ensure_not_active;
use tidewatch_core::{ConfigError, Deletion, EntityId, RestoreMatch, Tier, TidewatchResult};
use tidewatch_storage::{StateFilter, TierCounts, TierPredicate, WriteBatch, WriteOp};
use tracing::instrument;

impl LifecycleEngine {
    /// Which tombstoned descendants belong to the target's cascade.
    fn descendant_filter(&self, deletion: &Deletion) -> TidewatchResult<StateFilter> {
        match self.config.restore_match {
            RestoreMatch::TimeWindow { tolerance } => {
                let out_of_range = |reason: String| ConfigError::InvalidValue {
                    field: "restore_match".to_string(),
                    value: format!("{:?}", tolerance),
                    reason,
                };
                let window = chrono::Duration::from_std(tolerance)
                    .map_err(|e| out_of_range(e.to_string()))?;
                let (from, to) = deletion.window(window).ok_or_else(|| {
                    out_of_range("window exceeds the representable time range".to_string())
                })?;
                Ok(StateFilter::DeletedBetween { from, to })
            }
            RestoreMatch::CascadeGroup => Ok(StateFilter::DeletedInGroup(deletion.cascade_group)),
        }
    }

    /// Undo a soft delete of `id` and of the descendants deleted with it.
    ///
    /// Restoring an active row is a no-op. The target is refused with
    /// `ActiveUniquenessConflict` if a live row took one of its keys;
    /// descendants in the same position are skipped and counted instead.
    #[instrument(skip(self), fields(tier = %tier, id = %id))]
    pub async fn restore(&self, tier: Tier, id: EntityId) -> TidewatchResult<RestoreOutcome> {
        let target = self.get_any(tier, id).await?;
        let Some(deletion) = target.deletion().copied() else {
            tracing::debug!(tier = %tier, id = %id, "Restore target already active");
            return Ok(RestoreOutcome::unchanged(target));
        };

        // A deferred audio cascade still in flight would re-delete what we
        // restore, so finish it first.
        if let Some(project) = self.gateway.owning_project(tier, id).await? {
            if project.pending_cascade {
                self.drain_pending(project.id).await?;
            }
        }

        ensure_not_active(self.gateway.as_ref(), &target.identity_keys(), Some(id)).await?;

        let filter = self.descendant_filter(&deletion)?;
        let mut batch = WriteBatch::new();
        batch.revive(TierPredicate::row(tier, id).with_state(StateFilter::Deleted));
        for below in tier.descendants() {
            batch.revive(TierPredicate::under(*below, tier, id).with_state(filter));
        }

        let outcomes = self.gateway.apply(&batch).await?;
        let mut restored = TierCounts::default();
        let mut skipped = TierCounts::default();
        for (op, outcome) in batch.ops().iter().zip(&outcomes) {
            if let WriteOp::Update { predicate, .. } = op {
                restored.add(predicate.tier, outcome.affected);
                skipped.add(predicate.tier, outcome.skipped);
            }
        }

        if restored.get(tier) == 0 {
            // Lost a race with a concurrent create of the same key.
            tracing::warn!(tier = %tier, id = %id, "Restore target skipped by key guard");
        }

        let snapshot = self.get_any(tier, id).await?;
        tracing::info!(
            tier = %tier,
            id = %id,
            cascade_group = %deletion.cascade_group,
            restored = restored.total(),
            skipped = skipped.total(),
            "Restore committed"
        );

        Ok(RestoreOutcome {
            snapshot,
            restored,
            skipped,
        })
    }
}
