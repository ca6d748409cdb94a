//! Soft-delete state shared by every entity

use crate::{new_cascade_group, ActorId, CascadeGroupId, EntityId, Tier, Timestamp};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tombstone carried by a soft-deleted row.
///
/// An entity is active exactly when it carries no `Deletion`, so the
/// `is_deleted`/`deleted_at`/`deleted_by` triple can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Deletion {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub deleted_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub deleted_by: ActorId,
    /// Shared by every row tombstoned in the same cascade call.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub cascade_group: CascadeGroupId,
}

impl Deletion {
    /// Start a new cascade at `deleted_at`.
    pub fn new(deleted_at: Timestamp, deleted_by: ActorId) -> Self {
        Self {
            deleted_at,
            deleted_by,
            cascade_group: new_cascade_group(),
        }
    }

    /// Inclusive `[deleted_at - tolerance, deleted_at + tolerance]` window.
    ///
    /// `None` when either bound falls outside the representable range.
    pub fn window(&self, tolerance: Duration) -> Option<(Timestamp, Timestamp)> {
        let from = self.deleted_at.checked_sub_signed(tolerance)?;
        let to = self.deleted_at.checked_add_signed(tolerance)?;
        Some((from, to))
    }
}

/// An identifying key that must be unique among active rows.
///
/// Soft-deleted rows keep holding their keys until they are purged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum IdentityKey {
    ProjectName {
        name: String,
    },
    ProjectLocalizedName {
        name_zh: String,
    },
    PointName {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        project_id: EntityId,
        name: String,
    },
    DeploymentPhase {
        #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
        point_id: EntityId,
        phase: i32,
    },
    AudioObjectKey {
        object_key: String,
    },
    RecorderSerial {
        brand: String,
        model: String,
        serial: String,
    },
}

impl IdentityKey {
    /// Tier whose rows hold this key.
    pub fn tier(&self) -> Tier {
        match self {
            IdentityKey::ProjectName { .. } | IdentityKey::ProjectLocalizedName { .. } => {
                Tier::Project
            }
            IdentityKey::PointName { .. } => Tier::Point,
            IdentityKey::DeploymentPhase { .. } => Tier::Deployment,
            IdentityKey::AudioObjectKey { .. } => Tier::Audio,
            IdentityKey::RecorderSerial { .. } => Tier::Recorder,
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::ProjectName { name } => write!(f, "project name '{}'", name),
            IdentityKey::ProjectLocalizedName { name_zh } => {
                write!(f, "project localized name '{}'", name_zh)
            }
            IdentityKey::PointName { project_id, name } => {
                write!(f, "point name '{}' in project {}", name, project_id)
            }
            IdentityKey::DeploymentPhase { point_id, phase } => {
                write!(f, "deployment phase {} at point {}", phase, point_id)
            }
            IdentityKey::AudioObjectKey { object_key } => {
                write!(f, "audio object key '{}'", object_key)
            }
            IdentityKey::RecorderSerial {
                brand,
                model,
                serial,
            } => write!(f, "recorder {}/{}/{}", brand, model, serial),
        }
    }
}

/// Common soft-delete surface of every entity.
pub trait Lifecycle {
    const TIER: Tier;

    fn id(&self) -> EntityId;

    /// Id of the owning row in the tree, if any.
    fn parent_id(&self) -> Option<EntityId>;

    fn deletion(&self) -> Option<&Deletion>;

    fn set_deletion(&mut self, deletion: Option<Deletion>);

    /// Keys this row reserves while it exists.
    fn identity_keys(&self) -> Vec<IdentityKey>;

    fn is_deleted(&self) -> bool {
        self.deletion().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_window_is_centered_on_stamp() {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let a = Deletion::new(base, Uuid::nil());
        let (from, to) = a.window(Duration::seconds(5)).expect("window in range");
        assert_eq!(from, base - Duration::seconds(5));
        assert_eq!(to, base + Duration::seconds(5));
    }

    #[test]
    fn test_window_overflow_is_none() {
        let a = Deletion::new(Utc::now(), Uuid::nil());
        assert_eq!(a.window(Duration::seconds(10_000_000_000_000)), None);
    }

    #[test]
    fn test_each_cascade_gets_its_own_group() {
        let now = Utc::now();
        let a = Deletion::new(now, Uuid::nil());
        let b = Deletion::new(now, Uuid::nil());
        assert_ne!(a.cascade_group, b.cascade_group);
    }

    #[test]
    fn test_identity_key_display_and_tier() {
        let key = IdentityKey::RecorderSerial {
            brand: "SoundTrap".to_string(),
            model: "ST600".to_string(),
            serial: "6012".to_string(),
        };
        assert_eq!(key.tier(), Tier::Recorder);
        assert_eq!(key.to_string(), "recorder SoundTrap/ST600/6012");
        let key = IdentityKey::ProjectLocalizedName {
            name_zh: "海洋".to_string(),
        };
        assert_eq!(key.tier(), Tier::Project);
    }
}
