//! End-to-end lifecycle tests over the in-memory gateway.
//!
//! Each test builds a project tree through the engine, then checks the
//! cascade, restore, purge and reservation rules against the stored rows.

use std::sync::Arc;
use std::time::Duration;
use tidewatch_core::{Deletion, Lifecycle, LifecycleConfig, Record, RestoreMatch, Tier};
use tidewatch_lifecycle::{
    spawn_cascade_worker, CascadeWorker, DispatcherConfig, LifecycleEngine, NewDeployment,
};
use tidewatch_storage::{InMemoryBlobStore, InMemoryGateway, Page, PersistenceGateway};
use tidewatch_test_utils::assertions::{
    assert_active, assert_conflict, assert_not_found, assert_referential_block, assert_reserved,
    assert_tombstoned_with,
};
use tidewatch_test_utils::fixtures::{new_project, new_recorder, Harness, ProjectTree, TreeShape};
use tidewatch_test_utils::{FailingBlobStore, StalledBlobStore};
use tokio::sync::watch;
use uuid::Uuid;

// ============================================================================
// HELPERS
// ============================================================================

async fn record(engine: &LifecycleEngine, tier: Tier, id: Uuid) -> Record {
    engine.get_any(tier, id).await.unwrap()
}

/// Every row of the tree, project first.
fn rows(tree: &ProjectTree) -> Vec<(Tier, Uuid)> {
    let mut rows = vec![(Tier::Project, tree.project.id)];
    rows.extend(tree.points.iter().map(|p| (Tier::Point, p.id)));
    rows.extend(tree.deployments.iter().map(|d| (Tier::Deployment, d.id)));
    rows.extend(tree.audio.iter().map(|a| (Tier::Audio, a.id)));
    rows
}

fn deletion_of(record: &Record) -> Deletion {
    *record.deletion().expect("row should be tombstoned")
}

// ============================================================================
// SOFT DELETE
// ============================================================================

#[tokio::test]
async fn test_project_cascade_stamps_whole_tree() {
    let h = Harness::inline().unwrap();
    let shape = TreeShape::new(2, 2, 3);
    let tree = h.tree("alpha", shape).await.unwrap();
    let actor = Uuid::now_v7();

    let outcome = h
        .engine
        .soft_delete(Tier::Project, tree.project.id, actor)
        .await
        .unwrap();
    assert_eq!(outcome.affected.total() as usize, shape.rows());
    assert!(outcome.deferred_job.is_none());

    let deletion = deletion_of(&outcome.snapshot);
    assert_eq!(deletion.deleted_by, actor);
    for (tier, id) in rows(&tree) {
        assert_tombstoned_with(&record(&h.engine, tier, id).await, &deletion);
        assert_not_found(&h.engine.get_active(tier, id).await, tier);
    }

    // The recorder is not part of the tree.
    assert_active(&record(&h.engine, Tier::Recorder, tree.recorder.id).await);
    assert!(h
        .engine
        .list_active(Tier::Project, None, Page::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_deferred_audio_applied_by_sweep() {
    let h = Harness::new(LifecycleConfig::default()).unwrap();
    let tree = h.tree("beta", TreeShape::new(1, 2, 2)).await.unwrap();

    let outcome = h
        .engine
        .soft_delete(Tier::Project, tree.project.id, Uuid::now_v7())
        .await
        .unwrap();
    let deletion = deletion_of(&outcome.snapshot);
    assert_eq!(outcome.affected.audio, 0);
    assert!(outcome.deferred_job.is_some());

    // Audio stays readable until the job runs.
    for audio in &tree.audio {
        assert_active(&record(&h.engine, Tier::Audio, audio.id).await);
    }

    let worker = CascadeWorker::new(h.gateway.clone(), DispatcherConfig::development());
    assert_eq!(worker.process_pending().await, 1);
    assert_eq!(worker.metrics().snapshot().audio_tombstoned, 4);

    for (tier, id) in rows(&tree) {
        assert_tombstoned_with(&record(&h.engine, tier, id).await, &deletion);
    }
    let Record::Project(project) = record(&h.engine, Tier::Project, tree.project.id).await else {
        panic!("expected project");
    };
    assert!(!project.pending_cascade);
    assert_eq!(h.gateway.job_count(), 0);

    // A second sweep finds nothing.
    assert_eq!(worker.process_pending().await, 0);
}

#[tokio::test]
async fn test_dispatcher_notification_applies_job() {
    let h = Harness::new(LifecycleConfig::default()).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = DispatcherConfig {
        sweep_interval: Duration::from_secs(3600),
        ..DispatcherConfig::development()
    };
    let (dispatcher, handle) = spawn_cascade_worker(h.gateway.clone(), config, shutdown_rx);
    let engine = h.engine.clone().with_dispatcher(dispatcher);

    let tree = h.tree("gamma", TreeShape::new(1, 1, 3)).await.unwrap();
    engine
        .soft_delete(Tier::Project, tree.project.id, Uuid::now_v7())
        .await
        .unwrap();

    let mut drained = false;
    for _ in 0..100 {
        if h.gateway.job_count() == 0 {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(drained, "cascade job was not applied");
    for audio in &tree.audio {
        assert!(record(&engine, Tier::Audio, audio.id).await.is_deleted());
    }

    shutdown_tx.send(true).unwrap();
    let metrics = handle.await.unwrap().snapshot();
    assert_eq!(metrics.jobs_applied, 1);
    assert_eq!(metrics.audio_tombstoned, 3);
}

#[tokio::test]
async fn test_earlier_child_delete_keeps_its_stamp() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("delta", TreeShape::new(2, 1, 1)).await.unwrap();
    let early = h
        .engine
        .soft_delete(Tier::Point, tree.points[0].id, Uuid::now_v7())
        .await
        .unwrap();
    let early = deletion_of(&early.snapshot);

    h.clock.advance_secs(60);
    let late = h
        .engine
        .soft_delete(Tier::Project, tree.project.id, Uuid::now_v7())
        .await
        .unwrap();
    assert_eq!(late.affected.point, 1);

    assert_tombstoned_with(
        &record(&h.engine, Tier::Point, tree.points[0].id).await,
        &early,
    );
    assert_tombstoned_with(
        &record(&h.engine, Tier::Audio, tree.audio[0].id).await,
        &early,
    );
}

#[tokio::test]
async fn test_soft_delete_deleted_row_is_not_found() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("epsilon", TreeShape::new(1, 1, 1)).await.unwrap();
    let audio = tree.audio[0].id;

    let outcome = h
        .engine
        .soft_delete(Tier::Audio, audio, Uuid::now_v7())
        .await
        .unwrap();
    assert_eq!(outcome.affected.total(), 1);

    let again = h.engine.soft_delete(Tier::Audio, audio, Uuid::now_v7()).await;
    assert_not_found(&again, Tier::Audio);
}

// ============================================================================
// RESTORE
// ============================================================================

async fn restore_selectivity(config: LifecycleConfig) {
    let h = Harness::new(config).unwrap();
    let tree = h.tree("zeta", TreeShape::new(2, 1, 2)).await.unwrap();

    let early = h
        .engine
        .soft_delete(Tier::Point, tree.points[0].id, Uuid::now_v7())
        .await
        .unwrap();
    let early = deletion_of(&early.snapshot);

    h.clock.advance_secs(60);
    h.engine
        .soft_delete(Tier::Project, tree.project.id, Uuid::now_v7())
        .await
        .unwrap();

    let outcome = h
        .engine
        .restore(Tier::Project, tree.project.id)
        .await
        .unwrap();
    assert_eq!(outcome.restored.project, 1);
    assert_eq!(outcome.restored.point, 1);
    assert_eq!(outcome.restored.deployment, 1);
    assert_eq!(outcome.restored.audio, 2);
    assert_eq!(outcome.skipped.total(), 0);

    let Record::Project(project) = &outcome.snapshot else {
        panic!("expected project");
    };
    assert!(project.deletion.is_none());
    assert!(!project.pending_cascade);

    // Point 0's subtree was deleted a minute earlier and stays deleted.
    let early_rows = [
        (Tier::Point, tree.points[0].id),
        (Tier::Deployment, tree.deployments[0].id),
        (Tier::Audio, tree.audio[0].id),
        (Tier::Audio, tree.audio[1].id),
    ];
    for (tier, id) in early_rows {
        assert_tombstoned_with(&record(&h.engine, tier, id).await, &early);
    }
    let late_rows = [
        (Tier::Point, tree.points[1].id),
        (Tier::Deployment, tree.deployments[1].id),
        (Tier::Audio, tree.audio[2].id),
        (Tier::Audio, tree.audio[3].id),
    ];
    for (tier, id) in late_rows {
        assert_active(&record(&h.engine, tier, id).await);
    }
}

#[tokio::test]
async fn test_restore_by_time_window_skips_earlier_deletes() {
    restore_selectivity(LifecycleConfig::default()).await;
}

#[tokio::test]
async fn test_restore_by_cascade_group_skips_earlier_deletes() {
    restore_selectivity(LifecycleConfig {
        restore_match: RestoreMatch::CascadeGroup,
        ..LifecycleConfig::default()
    })
    .await;
}

#[tokio::test]
async fn test_restore_active_row_is_noop() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("eta", TreeShape::new(1, 1, 1)).await.unwrap();
    let before = record(&h.engine, Tier::Point, tree.points[0].id).await;

    let outcome = h
        .engine
        .restore(Tier::Point, tree.points[0].id)
        .await
        .unwrap();
    assert!(outcome.is_noop());
    assert_eq!(outcome.snapshot, before);
}

#[tokio::test]
async fn test_restore_child_under_deleted_parent() {
    let h = Harness::new(LifecycleConfig::default()).unwrap();
    let tree = h.tree("theta", TreeShape::new(1, 1, 2)).await.unwrap();
    h.engine
        .soft_delete(Tier::Project, tree.project.id, Uuid::now_v7())
        .await
        .unwrap();

    // The pending audio job is drained before the point comes back.
    let outcome = h
        .engine
        .restore(Tier::Point, tree.points[0].id)
        .await
        .unwrap();
    assert_eq!(outcome.restored.point, 1);
    assert_eq!(outcome.restored.audio, 2);
    assert_eq!(h.gateway.job_count(), 0);
    assert!(record(&h.engine, Tier::Project, tree.project.id)
        .await
        .is_deleted());
}

#[tokio::test]
async fn test_restore_counts_descendant_with_taken_key_as_skipped() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("kappa", TreeShape::new(2, 0, 0)).await.unwrap();
    h.engine
        .soft_delete(Tier::Project, tree.project.id, Uuid::now_v7())
        .await
        .unwrap();

    // An active row takes the first point's name while the project is down.
    let mut usurper = tree.points[0].clone();
    usurper.id = Uuid::now_v7();
    usurper.deletion = None;
    h.gateway.insert(&Record::Point(usurper.clone())).await.unwrap();

    let outcome = h
        .engine
        .restore(Tier::Project, tree.project.id)
        .await
        .unwrap();
    assert_eq!(outcome.restored.project, 1);
    assert_eq!(outcome.restored.point, 1);
    assert_eq!(outcome.skipped.point, 1);
    assert_eq!(outcome.skipped.total(), 1);

    assert!(record(&h.engine, Tier::Point, tree.points[0].id)
        .await
        .is_deleted());
    assert_active(&record(&h.engine, Tier::Point, tree.points[1].id).await);
    assert_active(&record(&h.engine, Tier::Point, usurper.id).await);
}

#[tokio::test]
async fn test_restore_missing_row_is_not_found() {
    let h = Harness::inline().unwrap();
    let result = h.engine.restore(Tier::Audio, Uuid::now_v7()).await;
    assert_not_found(&result, Tier::Audio);
}

// ============================================================================
// NAME RESERVATION
// ============================================================================

#[tokio::test]
async fn test_project_name_reserved_until_hard_delete() {
    let h = Harness::inline().unwrap();
    let project = h.engine.create_project(new_project("alpha")).await.unwrap();

    assert_conflict(&h.engine.create_project(new_project("alpha")).await);

    h.engine
        .soft_delete(Tier::Project, project.id, Uuid::now_v7())
        .await
        .unwrap();
    assert_reserved(&h.engine.create_project(new_project("alpha")).await);

    h.engine
        .hard_delete(Tier::Project, project.id)
        .await
        .unwrap();
    let again = h.engine.create_project(new_project("alpha")).await.unwrap();
    assert_ne!(again.id, project.id);
}

#[tokio::test]
async fn test_deleted_phase_blocks_next_deployment() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("iota", TreeShape::new(1, 1, 0)).await.unwrap();
    h.engine
        .soft_delete(Tier::Deployment, tree.deployments[0].id, Uuid::now_v7())
        .await
        .unwrap();

    let result = h
        .engine
        .create_deployment(NewDeployment {
            point_id: tree.points[0].id,
            recorder_id: tree.recorder.id,
            start_time: None,
            end_time: None,
            status: None,
            description: None,
        })
        .await;
    assert_reserved(&result);
}

#[tokio::test]
async fn test_recorder_serial_reserved() {
    let h = Harness::inline().unwrap();
    let recorder = h.engine.create_recorder(new_recorder("SN-1")).await.unwrap();
    h.engine
        .soft_delete(Tier::Recorder, recorder.id, Uuid::now_v7())
        .await
        .unwrap();
    assert_reserved(&h.engine.create_recorder(new_recorder("SN-1")).await);

    let restored = h.engine.restore(Tier::Recorder, recorder.id).await.unwrap();
    assert_eq!(restored.restored.recorder, 1);
    assert_eq!(restored.snapshot.identity_keys(), recorder.identity_keys());
}

// ============================================================================
// HARD DELETE
// ============================================================================

#[tokio::test]
async fn test_hard_delete_batches_blob_keys() {
    let h = Harness::inline().unwrap();
    let shape = TreeShape::new(1, 1, 1500);
    let tree = h.tree("kappa", shape).await.unwrap();
    assert_eq!(h.blobs.object_count("kappa"), 1500);

    let report = h
        .engine
        .hard_delete(Tier::Project, tree.project.id)
        .await
        .unwrap();
    assert_eq!(h.blobs.delete_batches(), vec![1000, 500]);
    assert_eq!(report.blob_batches, 2);
    assert!(!report.blob_failures());
    assert_eq!(report.deleted_leaf_count, 1500);
    assert_eq!(report.removed.total() as usize, shape.rows());
    assert!(report.bucket_removed);
    assert!(!h.blobs.has_bucket("kappa"));
    assert_eq!(h.gateway.row_count(Tier::Audio), 0);
}

#[tokio::test]
async fn test_hard_delete_of_deleted_subtree() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("lambda", TreeShape::new(2, 1, 2)).await.unwrap();
    h.engine
        .soft_delete(Tier::Point, tree.points[0].id, Uuid::now_v7())
        .await
        .unwrap();

    let report = h
        .engine
        .hard_delete(Tier::Point, tree.points[0].id)
        .await
        .unwrap();
    assert_eq!(report.removed.point, 1);
    assert_eq!(report.removed.deployment, 1);
    assert_eq!(report.deleted_leaf_count, 2);
    assert!(!report.bucket_removed);
    assert!(!h.blobs.contains("lambda", &tree.audio[0].object_key));
    assert!(h.blobs.contains("lambda", &tree.audio[2].object_key));
    assert_eq!(h.gateway.row_count(Tier::Point), 1);
}

#[tokio::test]
async fn test_hard_delete_single_audio() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("mu", TreeShape::new(1, 1, 2)).await.unwrap();

    let report = h
        .engine
        .hard_delete(Tier::Audio, tree.audio[0].id)
        .await
        .unwrap();
    assert_eq!(report.deleted_leaf_count, 1);
    assert_eq!(report.blob_batches, 1);
    assert!(h.blobs.delete_batches().is_empty());
    assert_eq!(h.blobs.object_count("mu"), 1);
}

#[tokio::test]
async fn test_referenced_recorder_is_refused() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("nu", TreeShape::new(1, 3, 0)).await.unwrap();

    let result = h.engine.hard_delete(Tier::Recorder, tree.recorder.id).await;
    assert_referential_block(&result, 3);
    assert_active(&record(&h.engine, Tier::Recorder, tree.recorder.id).await);

    // Tombstoned deployments still hold the reference.
    h.engine
        .soft_delete(Tier::Point, tree.points[0].id, Uuid::now_v7())
        .await
        .unwrap();
    let result = h.engine.hard_delete(Tier::Recorder, tree.recorder.id).await;
    assert_referential_block(&result, 3);

    h.engine
        .hard_delete(Tier::Project, tree.project.id)
        .await
        .unwrap();
    let report = h
        .engine
        .hard_delete(Tier::Recorder, tree.recorder.id)
        .await
        .unwrap();
    assert_eq!(report.removed.recorder, 1);
}

#[tokio::test]
async fn test_deleted_recorder_cannot_be_deployed() {
    let h = Harness::inline().unwrap();
    let tree = h.tree("xi", TreeShape::new(1, 1, 0)).await.unwrap();
    h.engine
        .soft_delete(Tier::Recorder, tree.recorder.id, Uuid::now_v7())
        .await
        .unwrap();

    let result = h
        .engine
        .create_deployment(NewDeployment {
            point_id: tree.points[0].id,
            recorder_id: tree.recorder.id,
            start_time: None,
            end_time: None,
            status: None,
            description: None,
        })
        .await;
    assert!(matches!(
        result.unwrap_err().as_lifecycle(),
        Some(tidewatch_core::LifecycleError::InactiveReference {
            tier: Tier::Recorder,
            ..
        })
    ));
}

#[tokio::test]
async fn test_blob_failure_does_not_block_purge() {
    let seeded = Harness::inline().unwrap();
    let tree = seeded.tree("omicron", TreeShape::new(1, 2, 3)).await.unwrap();

    // Same rows, but every blob call fails.
    let failing = Arc::new(FailingBlobStore::new());
    let engine = LifecycleEngine::new(
        seeded.gateway.clone(),
        failing.clone(),
        LifecycleConfig::default(),
    )
    .unwrap();

    let report = engine
        .hard_delete(Tier::Project, tree.project.id)
        .await
        .unwrap();
    assert!(report.blob_failures());
    assert_eq!(report.failed_blob_keys, 6);
    assert!(!report.bucket_removed);
    assert_eq!(report.deleted_leaf_count, 6);
    assert_eq!(seeded.gateway.row_count(Tier::Project), 0);
    assert_eq!(failing.calls(), 2);
}

#[tokio::test]
async fn test_stalled_blob_store_times_out() {
    let gateway = Arc::new(InMemoryGateway::new());
    let blobs = InMemoryBlobStore::new();
    let seeding = LifecycleEngine::new(
        gateway.clone(),
        Arc::new(blobs.clone()),
        LifecycleConfig::default(),
    )
    .unwrap();
    let tree = tidewatch_test_utils::fixtures::build_tree(
        &seeding,
        &blobs,
        "pi",
        TreeShape::new(1, 1, 2),
    )
    .await
    .unwrap();

    let engine = LifecycleEngine::new(
        gateway.clone(),
        Arc::new(StalledBlobStore),
        LifecycleConfig {
            blob_timeout: Duration::from_millis(20),
            ..LifecycleConfig::default()
        },
    )
    .unwrap();
    let report = engine
        .hard_delete(Tier::Project, tree.project.id)
        .await
        .unwrap();
    assert_eq!(report.failed_blob_batches, 1);
    assert_eq!(gateway.row_count(Tier::Audio), 0);
}

#[tokio::test]
async fn test_hard_delete_missing_row_is_not_found() {
    let h = Harness::inline().unwrap();
    let result = h.engine.hard_delete(Tier::Project, Uuid::now_v7()).await;
    assert_not_found(&result, Tier::Project);
}
