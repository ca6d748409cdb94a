//! Persistence gateway contract.
//!
//! Every cascade the engine performs is expressed as predicates over one tier
//! at a time. A predicate names a tier, a slice of the tree (one row, or every
//! row of that tier below an ancestor), and a lifecycle state filter.
//! Implementations evaluate predicates in bulk without loading full rows,
//! and apply a whole [`WriteBatch`] or [`PurgePlan`] in one transaction.

use ::async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tidewatch_core::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use tidewatch_core::{
    new_entity_id, CascadeGroupId, Deletion, EntityId, IdentityKey, Project, Record,
    StorageError, Tier, TidewatchResult, Timestamp,
};

// ============================================================================
// PREDICATES
// ============================================================================

/// Slice of the tree a predicate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeScope {
    /// Exactly one row.
    Row(EntityId),
    /// Every row below the `ancestor` row with id `id`.
    Under { ancestor: Tier, id: EntityId },
}

/// Lifecycle state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Any,
    Active,
    Deleted,
    /// Tombstoned with `from <= deleted_at <= to`.
    DeletedBetween { from: Timestamp, to: Timestamp },
    /// Tombstoned by the given cascade.
    DeletedInGroup(CascadeGroupId),
}

impl StateFilter {
    pub fn matches(&self, deletion: Option<&Deletion>) -> bool {
        match (self, deletion) {
            (StateFilter::Any, _) => true,
            (StateFilter::Active, None) => true,
            (StateFilter::Active, Some(_)) => false,
            (_, None) => false,
            (StateFilter::Deleted, Some(_)) => true,
            (StateFilter::DeletedBetween { from, to }, Some(d)) => {
                d.deleted_at >= *from && d.deleted_at <= *to
            }
            (StateFilter::DeletedInGroup(group), Some(d)) => d.cascade_group == *group,
        }
    }
}

/// Rows of one tier selected by tree position and lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPredicate {
    pub tier: Tier,
    pub scope: TreeScope,
    pub state: StateFilter,
}

impl TierPredicate {
    /// One row, any state.
    pub fn row(tier: Tier, id: EntityId) -> Self {
        Self {
            tier,
            scope: TreeScope::Row(id),
            state: StateFilter::Any,
        }
    }

    /// All `tier` rows below the `ancestor` row `id`, any state.
    pub fn under(tier: Tier, ancestor: Tier, id: EntityId) -> Self {
        Self {
            tier,
            scope: TreeScope::Under { ancestor, id },
            state: StateFilter::Any,
        }
    }

    pub fn with_state(mut self, state: StateFilter) -> Self {
        self.state = state;
        self
    }

    /// Reject predicates that walk the tree in the wrong direction.
    pub fn validate(&self) -> Result<(), StorageError> {
        if let TreeScope::Under { ancestor, .. } = self.scope {
            if !self.tier.is_below(ancestor) {
                return Err(StorageError::InvalidPredicate {
                    reason: format!("{} is not below {}", self.tier, ancestor),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// WRITES
// ============================================================================

/// Lifecycle transition applied to every row a predicate selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleChange {
    /// Stamp active rows with the tombstone. Deleted rows keep their own.
    Tombstone(Deletion),
    /// Clear the tombstone of deleted rows whose identifying keys are free.
    /// Rows whose key is held by another active row stay deleted and are
    /// reported as skipped.
    Revive,
}

/// Durable record of a deferred audio cascade for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeJob {
    pub id: EntityId,
    pub project_id: EntityId,
    pub deletion: Deletion,
    pub enqueued_at: Timestamp,
}

impl CascadeJob {
    pub fn new(project_id: EntityId, deletion: Deletion, enqueued_at: Timestamp) -> Self {
        Self {
            id: new_entity_id(),
            project_id,
            deletion,
            enqueued_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Update {
        predicate: TierPredicate,
        change: LifecycleChange,
    },
    /// Persist the job and raise the project's `pending_cascade` flag.
    EnqueueCascade(CascadeJob),
    /// Remove the job and recompute the flag. Fails with
    /// [`StorageError::CascadeJobMissing`] if the job is gone, which rolls
    /// back the whole batch.
    CompleteCascade { job_id: EntityId },
}

/// Ordered writes committed together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tombstone(&mut self, predicate: TierPredicate, deletion: Deletion) -> &mut Self {
        self.ops.push(WriteOp::Update {
            predicate,
            change: LifecycleChange::Tombstone(deletion),
        });
        self
    }

    pub fn revive(&mut self, predicate: TierPredicate) -> &mut Self {
        self.ops.push(WriteOp::Update {
            predicate,
            change: LifecycleChange::Revive,
        });
        self
    }

    pub fn enqueue(&mut self, job: CascadeJob) -> &mut Self {
        self.ops.push(WriteOp::EnqueueCascade(job));
        self
    }

    pub fn complete(&mut self, job_id: EntityId) -> &mut Self {
        self.ops.push(WriteOp::CompleteCascade { job_id });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Result of one [`WriteOp`], in batch order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpOutcome {
    pub affected: u64,
    pub skipped: u64,
}

/// Child-first deletes committed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgePlan {
    steps: Vec<TierPredicate>,
}

impl PurgePlan {
    /// Remove the target row and every descendant, leaves first.
    pub fn for_target(tier: Tier, id: EntityId) -> Self {
        let mut steps: Vec<TierPredicate> = tier
            .descendants()
            .iter()
            .rev()
            .map(|below| TierPredicate::under(*below, tier, id))
            .collect();
        steps.push(TierPredicate::row(tier, id));
        Self { steps }
    }

    pub fn steps(&self) -> &[TierPredicate] {
        &self.steps
    }
}

// ============================================================================
// COUNTS
// ============================================================================

/// Per-tier row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub project: u64,
    pub point: u64,
    pub deployment: u64,
    pub audio: u64,
    pub recorder: u64,
}

impl TierCounts {
    pub fn get(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Project => self.project,
            Tier::Point => self.point,
            Tier::Deployment => self.deployment,
            Tier::Audio => self.audio,
            Tier::Recorder => self.recorder,
        }
    }

    pub fn add(&mut self, tier: Tier, n: u64) {
        match tier {
            Tier::Project => self.project += n,
            Tier::Point => self.point += n,
            Tier::Deployment => self.deployment += n,
            Tier::Audio => self.audio += n,
            Tier::Recorder => self.recorder += n,
        }
    }

    pub fn total(&self) -> u64 {
        self.project + self.point + self.deployment + self.audio + self.recorder
    }
}

/// Deployments pointing at a recorder, split by lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCount {
    pub active: u64,
    pub tombstoned: u64,
}

impl ReferenceCount {
    pub fn total(&self) -> u64 {
        self.active + self.tombstoned
    }
}

/// Offset pagination for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn new(offset: u64, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

// ============================================================================
// GATEWAY TRAIT
// ============================================================================

/// Transactional access to the relational store.
///
/// Implementations must enforce the same constraints a relational schema
/// would: parents exist on insert, a parent with children cannot be purged
/// before them, and no two active rows share an identifying key.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Insert a new row.
    async fn insert(&self, record: &Record) -> TidewatchResult<()>;

    /// Overwrite the mutable fields of an existing row.
    async fn replace(&self, record: &Record) -> TidewatchResult<()>;

    /// Row by id if it is active.
    async fn find_active(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Record>>;

    /// Row by id in any state.
    async fn find_any(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Record>>;

    /// Active rows of a tier, optionally restricted to one parent, oldest first.
    async fn list_active(
        &self,
        tier: Tier,
        parent: Option<EntityId>,
        page: Page,
    ) -> TidewatchResult<Vec<Record>>;

    /// Whether an active row other than `exclude` holds the key.
    async fn exists_active(
        &self,
        key: &IdentityKey,
        exclude: Option<EntityId>,
    ) -> TidewatchResult<bool>;

    /// Whether a soft-deleted row other than `exclude` holds the key.
    async fn exists_deleted(
        &self,
        key: &IdentityKey,
        exclude: Option<EntityId>,
    ) -> TidewatchResult<bool>;

    /// Highest phase among the point's active deployments.
    async fn max_active_phase(&self, point_id: EntityId) -> TidewatchResult<Option<i32>>;

    async fn count(&self, predicate: &TierPredicate) -> TidewatchResult<u64>;

    async fn collect_ids(&self, predicate: &TierPredicate) -> TidewatchResult<Vec<EntityId>>;

    /// Object keys of the audio rows a predicate selects.
    async fn object_keys(&self, predicate: &TierPredicate) -> TidewatchResult<Vec<String>>;

    /// Project at the root of the row's tree, in any state.
    async fn owning_project(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Project>>;

    async fn recorder_references(&self, recorder_id: EntityId) -> TidewatchResult<ReferenceCount>;

    /// Apply every op in one transaction; outcomes follow batch order.
    async fn apply(&self, batch: &WriteBatch) -> TidewatchResult<Vec<OpOutcome>>;

    /// Delete every step's rows in one transaction.
    async fn purge(&self, plan: &PurgePlan) -> TidewatchResult<TierCounts>;

    /// Oldest outstanding cascade jobs.
    async fn pending_cascades(&self, limit: usize) -> TidewatchResult<Vec<CascadeJob>>;

    async fn pending_cascades_for(&self, project_id: EntityId) -> TidewatchResult<Vec<CascadeJob>>;

    async fn health_check(&self) -> TidewatchResult<bool>;
}
