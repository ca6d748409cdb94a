//! Tidewatch Test Utilities
//!
//! Shared test infrastructure for the Tidewatch workspace:
//! - A simulated clock for pinning cascade stamps
//! - Blob stores that fail or stall on demand
//! - Fixtures that build populated project trees
//! - Proptest generators and lifecycle assertions

pub use tidewatch_core::{
    Audio, BlobError, Clock, Deletion, Deployment, DeploymentStatus, EntityId, LifecycleConfig,
    LifecycleError, Point, Project, Record, Recorder, RecorderStatus, RestoreMatch, Tier,
    TidewatchError, TidewatchResult, Timestamp,
};
pub use tidewatch_lifecycle::LifecycleEngine;
pub use tidewatch_storage::{BlobStore, InMemoryBlobStore, InMemoryGateway};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// CLOCK
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct SimulatedClock {
    base: DateTime<Utc>,
    elapsed_ms: AtomicU64,
}

impl SimulatedClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base: base.trunc_subsecs(3),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    /// Anchored at 2024-01-01T00:00:00Z.
    pub fn deterministic() -> Self {
        let base = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(base)
    }

    pub fn advance(&self, duration: Duration) {
        self.elapsed_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Default for SimulatedClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Timestamp {
        let elapsed = self.elapsed_ms.load(Ordering::Relaxed);
        self.base + chrono::Duration::milliseconds(elapsed as i64)
    }
}

// ============================================================================
// BLOB STORES
// ============================================================================

/// Blob store whose every call fails. Counts the calls it refused.
#[derive(Debug, Default)]
pub struct FailingBlobStore {
    calls: AtomicUsize,
}

impl FailingBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn refuse(&self, bucket: &str, keys: usize) -> BlobError {
        self.calls.fetch_add(1, Ordering::Relaxed);
        BlobError::StorageDeletionFailure {
            bucket: bucket.to_string(),
            keys,
            reason: "object store unavailable".to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn delete_object(&self, bucket: &str, _key: &str) -> Result<(), BlobError> {
        Err(self.refuse(bucket, 1))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<(), BlobError> {
        Err(self.refuse(bucket, keys.len()))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BlobError> {
        Err(self.refuse(bucket, 0))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BlobError> {
        Err(self.refuse(bucket, 0))
    }
}

/// Blob store that never answers, for exercising call timeouts.
#[derive(Debug, Default, Clone, Copy)]
pub struct StalledBlobStore;

#[async_trait]
impl BlobStore for StalledBlobStore {
    async fn delete_object(&self, _bucket: &str, _key: &str) -> Result<(), BlobError> {
        std::future::pending().await
    }

    async fn delete_objects(&self, _bucket: &str, _keys: &[String]) -> Result<(), BlobError> {
        std::future::pending().await
    }

    async fn create_bucket(&self, _bucket: &str) -> Result<(), BlobError> {
        std::future::pending().await
    }

    async fn delete_bucket(&self, _bucket: &str) -> Result<(), BlobError> {
        std::future::pending().await
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tidewatch inputs.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_actor() -> impl Strategy<Value = Uuid> {
        arb_uuid()
    }

    /// Timestamps between 2020 and 2030, whole seconds.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }

    pub fn arb_tier() -> impl Strategy<Value = Tier> {
        prop_oneof![
            Just(Tier::Project),
            Just(Tier::Point),
            Just(Tier::Deployment),
            Just(Tier::Audio),
            Just(Tier::Recorder),
        ]
    }

    /// Tiers of the project tree, excluding the recorder registry.
    pub fn arb_tree_tier() -> impl Strategy<Value = Tier> {
        prop_oneof![
            Just(Tier::Project),
            Just(Tier::Point),
            Just(Tier::Deployment),
            Just(Tier::Audio),
        ]
    }

    pub fn arb_deployment_status() -> impl Strategy<Value = DeploymentStatus> {
        prop_oneof![
            Just(DeploymentStatus::Undeployed),
            Just(DeploymentStatus::Monitoring),
            Just(DeploymentStatus::Success),
            Just(DeploymentStatus::WaterIntrusion),
            Just(DeploymentStatus::Lost),
        ]
    }

    pub fn arb_recorder_status() -> impl Strategy<Value = RecorderStatus> {
        prop_oneof![
            Just(RecorderStatus::InService),
            Just(RecorderStatus::OutOfService),
            Just(RecorderStatus::UnderRepair),
            Just(RecorderStatus::UnderCalibration),
            Just(RecorderStatus::Broken),
            Just(RecorderStatus::Retired),
            Just(RecorderStatus::Lost),
            Just(RecorderStatus::CheckedOut),
        ]
    }

    pub fn arb_restore_match() -> impl Strategy<Value = RestoreMatch> {
        prop_oneof![
            (1u64..60).prop_map(|secs| RestoreMatch::TimeWindow {
                tolerance: Duration::from_secs(secs),
            }),
            Just(RestoreMatch::CascadeGroup),
        ]
    }

    /// Bucket-safe project names.
    pub fn arb_project_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{2,20}[a-z0-9]"
    }

    /// Small tree shapes: points, deployments per point, audio per deployment.
    pub fn arb_tree_shape() -> impl Strategy<Value = TreeShape> {
        (1usize..4, 1usize..3, 0usize..4).prop_map(|(points, deployments, audio)| TreeShape {
            points,
            deployments_per_point: deployments,
            audio_per_deployment: audio,
        })
    }

    pub use super::fixtures::TreeShape;
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Engines over in-memory stores and populated project trees.

    use super::*;
    use tidewatch_lifecycle::{NewAudio, NewDeployment, NewPoint, NewProject, NewRecorder};

    /// An engine wired to in-memory stores and a simulated clock.
    #[derive(Debug, Clone)]
    pub struct Harness {
        pub engine: LifecycleEngine,
        pub gateway: Arc<InMemoryGateway>,
        pub blobs: InMemoryBlobStore,
        pub clock: Arc<SimulatedClock>,
    }

    impl Harness {
        pub fn new(config: LifecycleConfig) -> TidewatchResult<Self> {
            let gateway = Arc::new(InMemoryGateway::new());
            let blobs = InMemoryBlobStore::new();
            let clock = Arc::new(SimulatedClock::deterministic());
            let engine = LifecycleEngine::new(gateway.clone(), Arc::new(blobs.clone()), config)?
                .with_clock(clock.clone());
            Ok(Self {
                engine,
                gateway,
                blobs,
                clock,
            })
        }

        /// Default config with the audio cascade applied inline.
        pub fn inline() -> TidewatchResult<Self> {
            Self::new(LifecycleConfig {
                defer_project_audio: false,
                ..LifecycleConfig::default()
            })
        }

        /// Build a tree and upload one object per audio row.
        pub async fn tree(&self, name: &str, shape: TreeShape) -> TidewatchResult<ProjectTree> {
            build_tree(&self.engine, &self.blobs, name, shape).await
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TreeShape {
        pub points: usize,
        pub deployments_per_point: usize,
        pub audio_per_deployment: usize,
    }

    impl TreeShape {
        pub fn new(points: usize, deployments_per_point: usize, audio_per_deployment: usize) -> Self {
            Self {
                points,
                deployments_per_point,
                audio_per_deployment,
            }
        }

        pub fn deployments(&self) -> usize {
            self.points * self.deployments_per_point
        }

        pub fn audio(&self) -> usize {
            self.deployments() * self.audio_per_deployment
        }

        /// Rows under and including the project.
        pub fn rows(&self) -> usize {
            1 + self.points + self.deployments() + self.audio()
        }
    }

    /// Everything created by [`build_tree`].
    #[derive(Debug, Clone)]
    pub struct ProjectTree {
        pub project: Project,
        pub recorder: Recorder,
        pub points: Vec<Point>,
        pub deployments: Vec<Deployment>,
        pub audio: Vec<Audio>,
    }

    impl ProjectTree {
        pub fn object_keys(&self) -> Vec<String> {
            self.audio.iter().map(|a| a.object_key.clone()).collect()
        }
    }

    pub fn new_recorder(serial: &str) -> NewRecorder {
        NewRecorder {
            brand: "SoundTrap".to_string(),
            model: "ST600".to_string(),
            serial: serial.to_string(),
            sensitivity: -176.2,
            status: None,
            description: None,
        }
    }

    pub fn new_project(name: &str) -> NewProject {
        NewProject {
            name: Some(name.to_string()),
            ..NewProject::default()
        }
    }

    /// Create a project with a full subtree through the engine, sharing one
    /// recorder, and put each audio object into `blobs`.
    pub async fn build_tree(
        engine: &LifecycleEngine,
        blobs: &InMemoryBlobStore,
        name: &str,
        shape: TreeShape,
    ) -> TidewatchResult<ProjectTree> {
        let recorder = engine.create_recorder(new_recorder(name)).await?;
        let project = engine.create_project(new_project(name)).await?;

        let mut points = Vec::with_capacity(shape.points);
        let mut deployments = Vec::with_capacity(shape.deployments());
        let mut audio = Vec::with_capacity(shape.audio());

        for p in 0..shape.points {
            let point = engine
                .create_point(NewPoint {
                    project_id: project.id,
                    name: format!("point-{}", p),
                    gps_lat_plan: Some(22.5),
                    gps_lon_plan: Some(120.1),
                    depth_plan: Some(30.0),
                    description: None,
                })
                .await?;

            for _ in 0..shape.deployments_per_point {
                let deployment = engine
                    .create_deployment(NewDeployment {
                        point_id: point.id,
                        recorder_id: recorder.id,
                        start_time: None,
                        end_time: None,
                        status: Some(DeploymentStatus::Monitoring),
                        description: None,
                    })
                    .await?;

                for a in 0..shape.audio_per_deployment {
                    let object_key = format!("{}/p{}/{}/{:04}.wav", name, p, deployment.phase, a);
                    blobs.put_object(project.bucket(), &object_key)?;
                    let row = engine
                        .create_audio(NewAudio {
                            deployment_id: deployment.id,
                            file_name: format!("{:04}.wav", a),
                            object_key,
                            file_size: Some(1_048_576),
                            record_time: None,
                            meta: None,
                        })
                        .await?;
                    audio.push(row);
                }
                deployments.push(deployment);
            }
            points.push(point);
        }

        Ok(ProjectTree {
            project,
            recorder,
            points,
            deployments,
            audio,
        })
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for lifecycle outcomes.

    use super::*;

    #[track_caller]
    fn lifecycle_error<T: std::fmt::Debug>(result: &TidewatchResult<T>) -> &LifecycleError {
        match result {
            Err(TidewatchError::Lifecycle(e)) => e,
            other => panic!("Expected lifecycle error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TidewatchResult<T>, tier: Tier) {
        match lifecycle_error(result) {
            LifecycleError::NotFound { tier: t, .. } => {
                assert_eq!(*t, tier, "Wrong tier in NotFound error")
            }
            other => panic!("Expected NotFound for {}, got: {:?}", tier, other),
        }
    }

    #[track_caller]
    pub fn assert_reserved<T: std::fmt::Debug>(result: &TidewatchResult<T>) {
        match lifecycle_error(result) {
            LifecycleError::ReservedIdentifier { .. } => {}
            other => panic!("Expected ReservedIdentifier, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &TidewatchResult<T>) {
        match lifecycle_error(result) {
            LifecycleError::ActiveUniquenessConflict { .. } => {}
            other => panic!("Expected ActiveUniquenessConflict, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_referential_block<T: std::fmt::Debug>(
        result: &TidewatchResult<T>,
        expected_count: u64,
    ) {
        match lifecycle_error(result) {
            LifecycleError::ReferentialBlock {
                count, tombstoned, ..
            } => assert_eq!(
                count + tombstoned,
                expected_count,
                "Wrong reference count in ReferentialBlock"
            ),
            other => panic!("Expected ReferentialBlock, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_active(record: &Record) {
        assert!(
            record.deletion().is_none(),
            "Expected active {} {}, found tombstone {:?}",
            record.tier(),
            record.id(),
            record.deletion()
        );
    }

    /// Assert the row carries exactly this tombstone.
    #[track_caller]
    pub fn assert_tombstoned_with(record: &Record, deletion: &Deletion) {
        assert_eq!(
            record.deletion(),
            Some(deletion),
            "Wrong tombstone on {} {}",
            record.tier(),
            record.id()
        );
    }
}
