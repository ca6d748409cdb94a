//! In-memory persistence gateway.
//!
//! Rows live in per-tier arenas keyed by id, with explicit parent → child
//! indices standing in for foreign keys. Writes are staged on a copy of the
//! tables and swapped in only when every op succeeds, which gives batches
//! and purges the same all-or-nothing behaviour as a database transaction.

use crate::gateway::{
    CascadeJob, LifecycleChange, OpOutcome, Page, PersistenceGateway, PurgePlan, ReferenceCount,
    TierCounts, TierPredicate, TreeScope, WriteBatch, WriteOp,
};
use ::async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use tidewatch_core::{
    Audio, Deletion, Deployment, EntityId, IdentityKey, Lifecycle, Point, Project, Record,
    Recorder, StorageError, Tier, TidewatchResult,
};

fn unique_constraint(key: &IdentityKey) -> &'static str {
    match key {
        IdentityKey::ProjectName { .. } => "uq_project_name_active",
        IdentityKey::ProjectLocalizedName { .. } => "uq_project_name_zh_active",
        IdentityKey::PointName { .. } => "uq_point_project_name_active",
        IdentityKey::DeploymentPhase { .. } => "uq_deployment_point_phase_active",
        IdentityKey::AudioObjectKey { .. } => "uq_audio_object_key_active",
        IdentityKey::RecorderSerial { .. } => "uq_recorder_brand_model_sn_active",
    }
}

fn fk_violation(constraint: &str, reason: String) -> StorageError {
    StorageError::ConstraintViolation {
        constraint: constraint.to_string(),
        reason,
    }
}

#[derive(Debug, Clone, Default)]
struct Tables {
    projects: BTreeMap<EntityId, Project>,
    points: BTreeMap<EntityId, Point>,
    deployments: BTreeMap<EntityId, Deployment>,
    audio: BTreeMap<EntityId, Audio>,
    recorders: BTreeMap<EntityId, Recorder>,
    /// Tree edges: parent row id → child row ids of the next tier.
    children: HashMap<EntityId, BTreeSet<EntityId>>,
    deployments_by_recorder: HashMap<EntityId, BTreeSet<EntityId>>,
    audio_by_key: HashMap<String, BTreeSet<EntityId>>,
    jobs: BTreeMap<EntityId, CascadeJob>,
}

impl Tables {
    // ========================================================================
    // ROW ACCESS
    // ========================================================================

    fn contains(&self, tier: Tier, id: EntityId) -> bool {
        match tier {
            Tier::Project => self.projects.contains_key(&id),
            Tier::Point => self.points.contains_key(&id),
            Tier::Deployment => self.deployments.contains_key(&id),
            Tier::Audio => self.audio.contains_key(&id),
            Tier::Recorder => self.recorders.contains_key(&id),
        }
    }

    fn get(&self, tier: Tier, id: EntityId) -> Option<Record> {
        match tier {
            Tier::Project => self.projects.get(&id).cloned().map(Record::from),
            Tier::Point => self.points.get(&id).cloned().map(Record::from),
            Tier::Deployment => self.deployments.get(&id).cloned().map(Record::from),
            Tier::Audio => self.audio.get(&id).cloned().map(Record::from),
            Tier::Recorder => self.recorders.get(&id).cloned().map(Record::from),
        }
    }

    fn deletion(&self, tier: Tier, id: EntityId) -> Option<Option<Deletion>> {
        match tier {
            Tier::Project => self.projects.get(&id).map(|r| r.deletion),
            Tier::Point => self.points.get(&id).map(|r| r.deletion),
            Tier::Deployment => self.deployments.get(&id).map(|r| r.deletion),
            Tier::Audio => self.audio.get(&id).map(|r| r.deletion),
            Tier::Recorder => self.recorders.get(&id).map(|r| r.deletion),
        }
    }

    fn set_deletion(&mut self, tier: Tier, id: EntityId, deletion: Option<Deletion>) {
        fn stamp<T: Lifecycle>(row: &mut T, deletion: Option<Deletion>) {
            row.set_deletion(deletion);
        }
        let touched = deletion.map(|d| d.deleted_at);
        match tier {
            Tier::Project => {
                if let Some(row) = self.projects.get_mut(&id) {
                    stamp(row, deletion);
                    if let Some(at) = touched {
                        row.updated_at = at;
                    }
                }
            }
            Tier::Point => {
                if let Some(row) = self.points.get_mut(&id) {
                    stamp(row, deletion);
                    if let Some(at) = touched {
                        row.updated_at = at;
                    }
                }
            }
            Tier::Deployment => {
                if let Some(row) = self.deployments.get_mut(&id) {
                    stamp(row, deletion);
                    if let Some(at) = touched {
                        row.updated_at = at;
                    }
                }
            }
            Tier::Audio => {
                if let Some(row) = self.audio.get_mut(&id) {
                    stamp(row, deletion);
                    if let Some(at) = touched {
                        row.updated_at = at;
                    }
                }
            }
            Tier::Recorder => {
                if let Some(row) = self.recorders.get_mut(&id) {
                    stamp(row, deletion);
                    if let Some(at) = touched {
                        row.updated_at = at;
                    }
                }
            }
        }
    }

    fn parent_of(&self, tier: Tier, id: EntityId) -> Option<EntityId> {
        match tier {
            Tier::Point => self.points.get(&id).map(|r| r.project_id),
            Tier::Deployment => self.deployments.get(&id).map(|r| r.point_id),
            Tier::Audio => self.audio.get(&id).map(|r| r.deployment_id),
            Tier::Project | Tier::Recorder => None,
        }
    }

    fn child_ids(&self, parent: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.children.get(&parent).into_iter().flatten().copied()
    }

    fn all_ids(&self, tier: Tier) -> Vec<EntityId> {
        match tier {
            Tier::Project => self.projects.keys().copied().collect(),
            Tier::Point => self.points.keys().copied().collect(),
            Tier::Deployment => self.deployments.keys().copied().collect(),
            Tier::Audio => self.audio.keys().copied().collect(),
            Tier::Recorder => self.recorders.keys().copied().collect(),
        }
    }

    // ========================================================================
    // PREDICATES
    // ========================================================================

    fn ids_in_scope(&self, tier: Tier, scope: TreeScope) -> Vec<EntityId> {
        match scope {
            TreeScope::Row(id) => {
                if self.contains(tier, id) {
                    vec![id]
                } else {
                    Vec::new()
                }
            }
            TreeScope::Under { ancestor, id } => {
                if !self.contains(ancestor, id) {
                    return Vec::new();
                }
                let mut frontier = vec![id];
                for level in ancestor.descendants() {
                    frontier = frontier
                        .iter()
                        .flat_map(|parent| self.child_ids(*parent))
                        .collect();
                    if *level == tier {
                        break;
                    }
                }
                frontier
            }
        }
    }

    fn select(&self, predicate: &TierPredicate) -> Result<Vec<EntityId>, StorageError> {
        predicate.validate()?;
        Ok(self
            .ids_in_scope(predicate.tier, predicate.scope)
            .into_iter()
            .filter(|id| {
                self.deletion(predicate.tier, *id)
                    .map(|d| predicate.state.matches(d.as_ref()))
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Rows holding the key, with their lifecycle state.
    fn holders(&self, key: &IdentityKey) -> Vec<(EntityId, bool)> {
        match key {
            IdentityKey::ProjectName { name } => self
                .projects
                .values()
                .filter(|p| &p.name == name)
                .map(|p| (p.id, p.is_deleted()))
                .collect(),
            IdentityKey::ProjectLocalizedName { name_zh } => self
                .projects
                .values()
                .filter(|p| p.name_zh.as_ref() == Some(name_zh))
                .map(|p| (p.id, p.is_deleted()))
                .collect(),
            IdentityKey::PointName { project_id, name } => self
                .child_ids(*project_id)
                .filter_map(|id| self.points.get(&id))
                .filter(|p| &p.name == name)
                .map(|p| (p.id, p.is_deleted()))
                .collect(),
            IdentityKey::DeploymentPhase { point_id, phase } => self
                .child_ids(*point_id)
                .filter_map(|id| self.deployments.get(&id))
                .filter(|d| d.phase == *phase)
                .map(|d| (d.id, d.is_deleted()))
                .collect(),
            IdentityKey::AudioObjectKey { object_key } => self
                .audio_by_key
                .get(object_key)
                .into_iter()
                .flatten()
                .filter_map(|id| self.audio.get(id))
                .map(|a| (a.id, a.is_deleted()))
                .collect(),
            IdentityKey::RecorderSerial {
                brand,
                model,
                serial,
            } => self
                .recorders
                .values()
                .filter(|r| &r.brand == brand && &r.model == model && &r.serial == serial)
                .map(|r| (r.id, r.is_deleted()))
                .collect(),
        }
    }

    fn key_held(&self, key: &IdentityKey, exclude: Option<EntityId>, deleted: bool) -> bool {
        self.holders(key)
            .into_iter()
            .any(|(id, is_deleted)| Some(id) != exclude && is_deleted == deleted)
    }

    fn check_active_keys(&self, record: &Record) -> Result<(), StorageError> {
        if record.is_deleted() {
            return Ok(());
        }
        for key in record.identity_keys() {
            if self.key_held(&key, Some(record.id()), false) {
                return Err(StorageError::ConstraintViolation {
                    constraint: unique_constraint(&key).to_string(),
                    reason: format!("{} is already held by an active row", key),
                });
            }
        }
        Ok(())
    }

    // ========================================================================
    // MUTATION
    // ========================================================================

    fn link(&mut self, parent: EntityId, child: EntityId) {
        self.children.entry(parent).or_default().insert(child);
    }

    fn unlink(&mut self, parent: EntityId, child: EntityId) {
        if let Some(set) = self.children.get_mut(&parent) {
            set.remove(&child);
            if set.is_empty() {
                self.children.remove(&parent);
            }
        }
    }

    fn check_references(&self, record: &Record) -> Result<(), StorageError> {
        let missing = |constraint: &str, tier: Tier, id: EntityId| {
            fk_violation(constraint, format!("{} {} does not exist", tier, id))
        };
        match record {
            Record::Point(p) if !self.projects.contains_key(&p.project_id) => Err(missing(
                "point_info_project_id_fkey",
                Tier::Project,
                p.project_id,
            )),
            Record::Deployment(d) if !self.points.contains_key(&d.point_id) => Err(missing(
                "deployment_info_point_id_fkey",
                Tier::Point,
                d.point_id,
            )),
            Record::Deployment(d) if !self.recorders.contains_key(&d.recorder_id) => Err(missing(
                "deployment_info_recorder_id_fkey",
                Tier::Recorder,
                d.recorder_id,
            )),
            Record::Audio(a) if !self.deployments.contains_key(&a.deployment_id) => Err(missing(
                "audio_info_deployment_id_fkey",
                Tier::Deployment,
                a.deployment_id,
            )),
            _ => Ok(()),
        }
    }

    fn insert(&mut self, record: Record) -> Result<(), StorageError> {
        let tier = record.tier();
        let id = record.id();
        if self.contains(tier, id) {
            return Err(StorageError::ConstraintViolation {
                constraint: format!("{}_pkey", tier.table_name()),
                reason: format!("duplicate id {}", id),
            });
        }
        self.check_references(&record)?;
        self.check_active_keys(&record)?;

        match record {
            Record::Project(p) => {
                self.projects.insert(id, p);
            }
            Record::Point(p) => {
                self.link(p.project_id, id);
                self.points.insert(id, p);
            }
            Record::Deployment(d) => {
                self.link(d.point_id, id);
                self.deployments_by_recorder
                    .entry(d.recorder_id)
                    .or_default()
                    .insert(id);
                self.deployments.insert(id, d);
            }
            Record::Audio(a) => {
                self.link(a.deployment_id, id);
                self.audio_by_key
                    .entry(a.object_key.clone())
                    .or_default()
                    .insert(id);
                self.audio.insert(id, a);
            }
            Record::Recorder(r) => {
                self.recorders.insert(id, r);
            }
        }
        Ok(())
    }

    fn replace(&mut self, mut record: Record) -> Result<(), StorageError> {
        let tier = record.tier();
        let id = record.id();
        let stored = self.get(tier, id).ok_or(StorageError::NotFound { tier, id })?;

        let moved = match (&stored, &record) {
            (Record::Deployment(old), Record::Deployment(new)) => {
                old.point_id != new.point_id || old.recorder_id != new.recorder_id
            }
            _ => stored.parent_id() != record.parent_id(),
        };
        if moved {
            return Err(StorageError::ConstraintViolation {
                constraint: format!("{}_parent", tier.table_name()),
                reason: "parent references are immutable".to_string(),
            });
        }

        // Lifecycle state only changes through batches.
        record.set_deletion(stored.deletion().copied());
        self.check_active_keys(&record)?;

        match record {
            Record::Project(p) => {
                self.projects.insert(id, p);
            }
            Record::Point(p) => {
                self.points.insert(id, p);
            }
            Record::Deployment(d) => {
                self.deployments.insert(id, d);
            }
            Record::Audio(a) => {
                if let Record::Audio(old) = &stored {
                    if old.object_key != a.object_key {
                        if let Some(set) = self.audio_by_key.get_mut(&old.object_key) {
                            set.remove(&id);
                        }
                        self.audio_by_key
                            .entry(a.object_key.clone())
                            .or_default()
                            .insert(id);
                    }
                }
                self.audio.insert(id, a);
            }
            Record::Recorder(r) => {
                self.recorders.insert(id, r);
            }
        }
        Ok(())
    }

    fn apply_update(
        &mut self,
        predicate: &TierPredicate,
        change: LifecycleChange,
    ) -> Result<OpOutcome, StorageError> {
        let tier = predicate.tier;
        let mut outcome = OpOutcome::default();
        for id in self.select(predicate)? {
            match (change, self.deletion(tier, id)) {
                (LifecycleChange::Tombstone(deletion), Some(None)) => {
                    self.set_deletion(tier, id, Some(deletion));
                    outcome.affected += 1;
                }
                (LifecycleChange::Revive, Some(Some(_))) => {
                    let keys = self
                        .get(tier, id)
                        .map(|r| r.identity_keys())
                        .unwrap_or_default();
                    if keys.iter().any(|k| self.key_held(k, Some(id), false)) {
                        outcome.skipped += 1;
                    } else {
                        self.set_deletion(tier, id, None);
                        outcome.affected += 1;
                    }
                }
                _ => {}
            }
        }
        Ok(outcome)
    }

    fn enqueue(&mut self, job: CascadeJob) -> Result<OpOutcome, StorageError> {
        let project = self.projects.get_mut(&job.project_id).ok_or_else(|| {
            fk_violation(
                "cascade_job_project_id_fkey",
                format!("project {} does not exist", job.project_id),
            )
        })?;
        project.pending_cascade = true;
        self.jobs.insert(job.id, job);
        Ok(OpOutcome {
            affected: 1,
            skipped: 0,
        })
    }

    fn complete(&mut self, job_id: EntityId) -> Result<OpOutcome, StorageError> {
        let job = self
            .jobs
            .remove(&job_id)
            .ok_or(StorageError::CascadeJobMissing { job_id })?;
        let still_pending = self.jobs.values().any(|j| j.project_id == job.project_id);
        if let Some(project) = self.projects.get_mut(&job.project_id) {
            project.pending_cascade = still_pending;
        }
        Ok(OpOutcome {
            affected: 1,
            skipped: 0,
        })
    }

    fn remove(&mut self, tier: Tier, id: EntityId) -> Result<(), StorageError> {
        if self.children.get(&id).is_some_and(|c| !c.is_empty()) {
            return Err(fk_violation(
                &format!("{}_children", tier.table_name()),
                format!("{} {} still has child rows", tier, id),
            ));
        }
        match tier {
            Tier::Project => {
                self.projects.remove(&id);
                self.jobs.retain(|_, job| job.project_id != id);
            }
            Tier::Point => {
                if let Some(p) = self.points.remove(&id) {
                    self.unlink(p.project_id, id);
                }
            }
            Tier::Deployment => {
                if let Some(d) = self.deployments.remove(&id) {
                    self.unlink(d.point_id, id);
                    if let Some(set) = self.deployments_by_recorder.get_mut(&d.recorder_id) {
                        set.remove(&id);
                    }
                }
            }
            Tier::Audio => {
                if let Some(a) = self.audio.remove(&id) {
                    self.unlink(a.deployment_id, id);
                    if let Some(set) = self.audio_by_key.get_mut(&a.object_key) {
                        set.remove(&id);
                        if set.is_empty() {
                            self.audio_by_key.remove(&a.object_key);
                        }
                    }
                }
            }
            Tier::Recorder => {
                if self
                    .deployments_by_recorder
                    .get(&id)
                    .is_some_and(|refs| !refs.is_empty())
                {
                    return Err(fk_violation(
                        "deployment_info_recorder_id_fkey",
                        format!("recorder {} is still referenced", id),
                    ));
                }
                self.recorders.remove(&id);
                self.deployments_by_recorder.remove(&id);
            }
        }
        Ok(())
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Thread-safe in-memory gateway for tests and embedded use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StorageError> {
        let guard = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&guard))
    }

    /// Run `f` against a staged copy and keep it only if `f` succeeds.
    fn transact<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut guard = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        let mut staged = guard.clone();
        let out = f(&mut staged)?;
        *guard = staged;
        Ok(out)
    }

    /// Number of rows stored for a tier, in any state.
    pub fn row_count(&self, tier: Tier) -> usize {
        self.read(|t| match tier {
            Tier::Project => t.projects.len(),
            Tier::Point => t.points.len(),
            Tier::Deployment => t.deployments.len(),
            Tier::Audio => t.audio.len(),
            Tier::Recorder => t.recorders.len(),
        })
        .unwrap_or(0)
    }

    pub fn job_count(&self) -> usize {
        self.read(|t| t.jobs.len()).unwrap_or(0)
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        *guard = Tables::default();
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn insert(&self, record: &Record) -> TidewatchResult<()> {
        let record = record.clone();
        Ok(self.transact(|t| t.insert(record))?)
    }

    async fn replace(&self, record: &Record) -> TidewatchResult<()> {
        let record = record.clone();
        Ok(self.transact(|t| t.replace(record))?)
    }

    async fn find_active(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Record>> {
        Ok(self.read(|t| t.get(tier, id).filter(|r| !r.is_deleted()))?)
    }

    async fn find_any(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Record>> {
        Ok(self.read(|t| t.get(tier, id))?)
    }

    async fn list_active(
        &self,
        tier: Tier,
        parent: Option<EntityId>,
        page: Page,
    ) -> TidewatchResult<Vec<Record>> {
        if parent.is_some() && tier.parent().is_none() {
            return Err(StorageError::InvalidPredicate {
                reason: format!("{} rows have no parent", tier),
            }
            .into());
        }
        Ok(self.read(|t| {
            let ids: Vec<EntityId> = match parent {
                Some(parent_id) => t
                    .child_ids(parent_id)
                    .filter(|id| t.contains(tier, *id))
                    .collect(),
                None => t.all_ids(tier),
            };
            ids.into_iter()
                .filter_map(|id| t.get(tier, id))
                .filter(|r| !r.is_deleted())
                .skip(page.offset as usize)
                .take(page.limit as usize)
                .collect()
        })?)
    }

    async fn exists_active(
        &self,
        key: &IdentityKey,
        exclude: Option<EntityId>,
    ) -> TidewatchResult<bool> {
        Ok(self.read(|t| t.key_held(key, exclude, false))?)
    }

    async fn exists_deleted(
        &self,
        key: &IdentityKey,
        exclude: Option<EntityId>,
    ) -> TidewatchResult<bool> {
        Ok(self.read(|t| t.key_held(key, exclude, true))?)
    }

    async fn max_active_phase(&self, point_id: EntityId) -> TidewatchResult<Option<i32>> {
        Ok(self.read(|t| {
            t.child_ids(point_id)
                .filter_map(|id| t.deployments.get(&id))
                .filter(|d| !d.is_deleted())
                .map(|d| d.phase)
                .max()
        })?)
    }

    async fn count(&self, predicate: &TierPredicate) -> TidewatchResult<u64> {
        Ok(self.read(|t| t.select(predicate).map(|ids| ids.len() as u64))??)
    }

    async fn collect_ids(&self, predicate: &TierPredicate) -> TidewatchResult<Vec<EntityId>> {
        Ok(self.read(|t| t.select(predicate))??)
    }

    async fn object_keys(&self, predicate: &TierPredicate) -> TidewatchResult<Vec<String>> {
        if predicate.tier != Tier::Audio {
            return Err(StorageError::InvalidPredicate {
                reason: format!("{} rows carry no object keys", predicate.tier),
            }
            .into());
        }
        Ok(self.read(|t| {
            t.select(predicate).map(|ids| {
                ids.iter()
                    .filter_map(|id| t.audio.get(id))
                    .map(|a| a.object_key.clone())
                    .collect()
            })
        })??)
    }

    async fn owning_project(&self, tier: Tier, id: EntityId) -> TidewatchResult<Option<Project>> {
        if tier == Tier::Recorder {
            return Ok(None);
        }
        Ok(self.read(|t| {
            let mut current = (tier, id);
            while current.0 != Tier::Project {
                let parent_tier = current.0.parent()?;
                let parent_id = t.parent_of(current.0, current.1)?;
                current = (parent_tier, parent_id);
            }
            t.projects.get(&current.1).cloned()
        })?)
    }

    async fn recorder_references(&self, recorder_id: EntityId) -> TidewatchResult<ReferenceCount> {
        Ok(self.read(|t| {
            let mut refs = ReferenceCount::default();
            for d in t
                .deployments_by_recorder
                .get(&recorder_id)
                .into_iter()
                .flatten()
                .filter_map(|id| t.deployments.get(id))
            {
                if d.is_deleted() {
                    refs.tombstoned += 1;
                } else {
                    refs.active += 1;
                }
            }
            refs
        })?)
    }

    async fn apply(&self, batch: &WriteBatch) -> TidewatchResult<Vec<OpOutcome>> {
        Ok(self.transact(|t| {
            batch
                .ops()
                .iter()
                .map(|op| match op {
                    WriteOp::Update { predicate, change } => t.apply_update(predicate, *change),
                    WriteOp::EnqueueCascade(job) => t.enqueue(*job),
                    WriteOp::CompleteCascade { job_id } => t.complete(*job_id),
                })
                .collect::<Result<Vec<_>, _>>()
        })?)
    }

    async fn purge(&self, plan: &PurgePlan) -> TidewatchResult<TierCounts> {
        Ok(self.transact(|t| {
            let mut counts = TierCounts::default();
            for step in plan.steps() {
                let ids = t.select(step)?;
                for id in &ids {
                    t.remove(step.tier, *id)?;
                }
                counts.add(step.tier, ids.len() as u64);
            }
            Ok(counts)
        })?)
    }

    async fn pending_cascades(&self, limit: usize) -> TidewatchResult<Vec<CascadeJob>> {
        Ok(self.read(|t| {
            let mut jobs: Vec<CascadeJob> = t.jobs.values().copied().collect();
            jobs.sort_by_key(|j| (j.enqueued_at, j.id));
            jobs.truncate(limit);
            jobs
        })?)
    }

    async fn pending_cascades_for(&self, project_id: EntityId) -> TidewatchResult<Vec<CascadeJob>> {
        Ok(self.read(|t| {
            let mut jobs: Vec<CascadeJob> = t
                .jobs
                .values()
                .filter(|j| j.project_id == project_id)
                .copied()
                .collect();
            jobs.sort_by_key(|j| (j.enqueued_at, j.id));
            jobs
        })?)
    }

    async fn health_check(&self) -> TidewatchResult<bool> {
        Ok(self.read(|_| true)?)
    }
}
