//! Identifier reservation checks.
//!
//! A key held by an active row is a conflict. A key held only by a
//! soft-deleted row is reserved: it frees up when that row is hard deleted.

use tidewatch_core::{EntityId, IdentityKey, LifecycleError, TidewatchResult};
use tidewatch_storage::PersistenceGateway;

/// Two-phase check run before a create or a key-changing update.
///
/// Every key is checked against active rows before any is checked against
/// tombstones, so a live conflict always wins over a reservation.
pub async fn ensure_available(
    gateway: &dyn PersistenceGateway,
    keys: &[IdentityKey],
    exclude: Option<EntityId>,
) -> TidewatchResult<()> {
    ensure_not_active(gateway, keys, exclude).await?;
    for key in keys {
        if gateway.exists_deleted(key, exclude).await? {
            return Err(LifecycleError::ReservedIdentifier { key: key.clone() }.into());
        }
    }
    Ok(())
}

/// Restore-time check: only live holders block.
pub async fn ensure_not_active(
    gateway: &dyn PersistenceGateway,
    keys: &[IdentityKey],
    exclude: Option<EntityId>,
) -> TidewatchResult<()> {
    for key in keys {
        if gateway.exists_active(key, exclude).await? {
            return Err(LifecycleError::ActiveUniquenessConflict { key: key.clone() }.into());
        }
    }
    Ok(())
}

/// Keys of `updated` that `current` does not already hold.
pub(crate) fn changed_keys(current: &[IdentityKey], updated: Vec<IdentityKey>) -> Vec<IdentityKey> {
    updated
        .into_iter()
        .filter(|key| !current.contains(key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tidewatch_core::{new_entity_id, Deletion, Lifecycle, Project, Record};
    use tidewatch_storage::{InMemoryGateway, TierPredicate, WriteBatch};
    use tidewatch_core::Tier;
    use uuid::Uuid;

    fn project(name: &str) -> Project {
        let now = Utc::now();
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

    fn name_key(name: &str) -> IdentityKey {
        IdentityKey::ProjectName {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_free_key_passes() {
        let gateway = InMemoryGateway::new();
        ensure_available(&gateway, &[name_key("alpha")], None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_active_holder_conflicts() {
        let gateway = InMemoryGateway::new();
        let alpha = project("alpha");
        gateway.insert(&Record::Project(alpha.clone())).await.unwrap();

        let err = ensure_available(&gateway, &[name_key("alpha")], None)
            .await
            .unwrap_err();
        assert_eq!(
            err.as_lifecycle(),
            Some(&LifecycleError::ActiveUniquenessConflict {
                key: name_key("alpha")
            })
        );

        // The holder itself is excluded.
        ensure_available(&gateway, &alpha.identity_keys(), Some(alpha.id))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_deleted_holder_reserves() {
        let gateway = InMemoryGateway::new();
        let alpha = project("alpha");
        gateway.insert(&Record::Project(alpha.clone())).await.unwrap();
        let mut batch = WriteBatch::new();
        batch.tombstone(
            TierPredicate::row(Tier::Project, alpha.id),
            Deletion::new(Utc::now(), Uuid::now_v7()),
        );
        gateway.apply(&batch).await.unwrap();

        let err = ensure_available(&gateway, &[name_key("alpha")], None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_lifecycle(),
            Some(LifecycleError::ReservedIdentifier { .. })
        ));

        // Restores only care about live holders.
        ensure_not_active(&gateway, &[name_key("alpha")], Some(alpha.id))
            .await
            .unwrap();
    }

    #[test]
    fn test_changed_keys_skips_held() {
        let current = vec![name_key("alpha")];
        let updated = vec![
            name_key("alpha"),
            IdentityKey::ProjectLocalizedName {
                name_zh: "阿尔法".to_string(),
            },
        ];
        let changed = changed_keys(&current, updated);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].to_string(), "project localized name '阿尔法'");
    }
}
