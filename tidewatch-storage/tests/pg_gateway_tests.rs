#![cfg(feature = "db-tests")]
//! PostgreSQL gateway tests.
//!
//! Run against a scratch database configured through `TIDEWATCH_DB_*`:
//! `cargo test -p tidewatch-storage --features db-tests`

use tidewatch_core::{
    new_entity_id, Clock, Deletion, IdentityKey, Project, Record, StorageError, SystemClock, Tier,
    TidewatchError,
};
use tidewatch_storage::{
    CascadeJob, DbConfig, PersistenceGateway, PgGateway, PurgePlan, StateFilter, TierPredicate,
    WriteBatch,
};
use uuid::Uuid;

async fn test_gateway() -> PgGateway {
    let gateway =
        PgGateway::from_config(&DbConfig::from_env()).expect("Failed to create gateway");
    gateway.migrate().await.expect("Failed to apply schema");
    gateway
}

fn project(name: &str) -> Project {
    let now = SystemClock.now();
    Project {
        id: new_entity_id(),
        name: name.to_string(),
        name_zh: None,
        area: None,
        description: None,
        pending_cascade: false,
        created_at: now,
        updated_at: now,
        deletion: None,
    }
}

fn unique_name() -> String {
    format!("pg-{}", &Uuid::now_v7().simple().to_string()[20..])
}

#[tokio::test]
async fn test_health_check() {
    let gateway = test_gateway().await;
    assert!(gateway.health_check().await.unwrap());
}

#[tokio::test]
async fn test_tombstone_reserves_and_revive_releases() {
    let gateway = test_gateway().await;
    let row = project(&unique_name());
    gateway.insert(&Record::Project(row.clone())).await.unwrap();
    let key = IdentityKey::ProjectName {
        name: row.name.clone(),
    };
    assert!(gateway.exists_active(&key, None).await.unwrap());

    let deletion = Deletion::new(SystemClock.now(), Uuid::now_v7());
    let mut batch = WriteBatch::new();
    batch.tombstone(
        TierPredicate::row(Tier::Project, row.id).with_state(StateFilter::Active),
        deletion,
    );
    let outcomes = gateway.apply(&batch).await.unwrap();
    assert_eq!(outcomes[0].affected, 1);

    assert!(!gateway.exists_active(&key, None).await.unwrap());
    assert!(gateway.exists_deleted(&key, None).await.unwrap());
    let stored = gateway
        .find_any(Tier::Project, row.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.deletion(), Some(&deletion));

    let mut batch = WriteBatch::new();
    batch.revive(TierPredicate::row(Tier::Project, row.id).with_state(StateFilter::Deleted));
    let outcomes = gateway.apply(&batch).await.unwrap();
    assert_eq!(outcomes[0].affected, 1);
    assert_eq!(outcomes[0].skipped, 0);
    assert!(gateway.find_active(Tier::Project, row.id).await.unwrap().is_some());

    gateway
        .purge(&PurgePlan::for_target(Tier::Project, row.id))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cascade_job_round_trip() {
    let gateway = test_gateway().await;
    let row = project(&unique_name());
    gateway.insert(&Record::Project(row.clone())).await.unwrap();

    let deletion = Deletion::new(SystemClock.now(), Uuid::now_v7());
    let job = CascadeJob::new(row.id, deletion, deletion.deleted_at);
    let mut batch = WriteBatch::new();
    batch.enqueue(job);
    gateway.apply(&batch).await.unwrap();

    let Some(Record::Project(flagged)) = gateway.find_any(Tier::Project, row.id).await.unwrap()
    else {
        panic!("expected project");
    };
    assert!(flagged.pending_cascade);
    assert_eq!(
        gateway.pending_cascades_for(row.id).await.unwrap(),
        vec![job]
    );

    let mut batch = WriteBatch::new();
    batch.complete(job.id);
    gateway.apply(&batch).await.unwrap();
    assert!(gateway.pending_cascades_for(row.id).await.unwrap().is_empty());

    // Completing twice rolls back with a missing-job error.
    let err = gateway.apply(&batch).await.unwrap_err();
    assert!(matches!(
        err,
        TidewatchError::Storage(StorageError::CascadeJobMissing { .. })
    ));

    let removed = gateway
        .purge(&PurgePlan::for_target(Tier::Project, row.id))
        .await
        .unwrap();
    assert_eq!(removed.project, 1);
}
