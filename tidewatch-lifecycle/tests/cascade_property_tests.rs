//! Property-Based Tests for Cascade Lifecycle
//!
//! **Property 1: Restore Inverts Soft Delete**
//!
//! For any tree shape, any tree tier and either restore policy, soft
//! deleting a row and restoring it leaves every row of its subtree active
//! again, and nothing outside the subtree is touched.
//!
//! **Property 2: Blob Batching**
//!
//! For any tree and batch size, a project hard delete issues
//! `ceil(audio / batch)` multi-object deletes, none larger than the batch
//! size, covering every audio object exactly once.

use proptest::prelude::*;
use tidewatch_core::{LifecycleConfig, Record, Tier};
use tidewatch_test_utils::fixtures::{Harness, ProjectTree};
use tidewatch_test_utils::generators::{arb_restore_match, arb_tree_shape, arb_tree_tier};
use tokio::runtime::Runtime;
use uuid::Uuid;

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn fail<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> TestCaseError + '_ {
    move |e| TestCaseError::fail(format!("{}: {}", context, e))
}

/// The first row of `tier` in the tree, with every row of its subtree.
fn subtree(tree: &ProjectTree, tier: Tier) -> Option<(Uuid, Vec<(Tier, Uuid)>)> {
    match tier {
        Tier::Project => {
            let mut rows = vec![(Tier::Project, tree.project.id)];
            rows.extend(tree.points.iter().map(|p| (Tier::Point, p.id)));
            rows.extend(tree.deployments.iter().map(|d| (Tier::Deployment, d.id)));
            rows.extend(tree.audio.iter().map(|a| (Tier::Audio, a.id)));
            Some((tree.project.id, rows))
        }
        Tier::Point => {
            let point = tree.points.first()?;
            let deployments: Vec<_> = tree
                .deployments
                .iter()
                .filter(|d| d.point_id == point.id)
                .collect();
            let mut rows = vec![(Tier::Point, point.id)];
            rows.extend(deployments.iter().map(|d| (Tier::Deployment, d.id)));
            rows.extend(
                tree.audio
                    .iter()
                    .filter(|a| deployments.iter().any(|d| d.id == a.deployment_id))
                    .map(|a| (Tier::Audio, a.id)),
            );
            Some((point.id, rows))
        }
        Tier::Deployment => {
            let deployment = tree.deployments.first()?;
            let mut rows = vec![(Tier::Deployment, deployment.id)];
            rows.extend(
                tree.audio
                    .iter()
                    .filter(|a| a.deployment_id == deployment.id)
                    .map(|a| (Tier::Audio, a.id)),
            );
            Some((deployment.id, rows))
        }
        Tier::Audio => tree
            .audio
            .first()
            .map(|a| (a.id, vec![(Tier::Audio, a.id)])),
        Tier::Recorder => None,
    }
}

fn all_rows(tree: &ProjectTree) -> Vec<(Tier, Uuid)> {
    subtree(tree, Tier::Project)
        .map(|(_, rows)| rows)
        .unwrap_or_default()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_restore_inverts_soft_delete(
        shape in arb_tree_shape(),
        tier in arb_tree_tier(),
        restore_match in arb_restore_match(),
        defer in any::<bool>(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = Harness::new(LifecycleConfig {
                restore_match,
                defer_project_audio: defer,
                ..LifecycleConfig::default()
            })
            .map_err(fail("harness"))?;
            let tree = h.tree("prop-tree", shape).await.map_err(fail("build tree"))?;

            let Some((target, rows)) = subtree(&tree, tier) else {
                // No audio in this shape.
                return Ok(());
            };

            h.engine
                .soft_delete(tier, target, Uuid::now_v7())
                .await
                .map_err(fail("soft delete"))?;
            let outcome = h.engine.restore(tier, target).await.map_err(fail("restore"))?;

            prop_assert_eq!(outcome.restored.total() as usize, rows.len());
            prop_assert_eq!(outcome.skipped.total(), 0);

            for (row_tier, id) in all_rows(&tree) {
                let record = h.engine.get_any(row_tier, id).await.map_err(fail("read"))?;
                prop_assert!(!record.is_deleted(), "{} {} left deleted", row_tier, id);
            }
            let Record::Project(project) = h
                .engine
                .get_any(Tier::Project, tree.project.id)
                .await
                .map_err(fail("read project"))?
            else {
                return Err(TestCaseError::fail("expected project"));
            };
            prop_assert!(!project.pending_cascade);
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn prop_blob_batches_cover_every_key(
        shape in arb_tree_shape(),
        batch_size in 1usize..8,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let h = Harness::new(LifecycleConfig {
                blob_batch_size: batch_size,
                ..LifecycleConfig::default()
            })
            .map_err(fail("harness"))?;
            let tree = h.tree("prop-blobs", shape).await.map_err(fail("build tree"))?;

            let report = h
                .engine
                .hard_delete(Tier::Project, tree.project.id)
                .await
                .map_err(fail("hard delete"))?;

            let audio = shape.audio();
            let batches = h.blobs.delete_batches();
            prop_assert_eq!(batches.len(), audio.div_ceil(batch_size));
            prop_assert!(batches.iter().all(|b| *b <= batch_size));
            prop_assert_eq!(batches.iter().sum::<usize>(), audio);
            prop_assert_eq!(report.deleted_leaf_count as usize, audio);
            prop_assert_eq!(h.blobs.object_count("prop-blobs"), 0);
            prop_assert!(report.bucket_removed);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
