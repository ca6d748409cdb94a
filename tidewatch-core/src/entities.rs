//! Entity structures for the monitoring hierarchy

use crate::{
    Deletion, DeploymentStatus, EntityId, IdentityKey, Lifecycle, RecorderStatus, Tier, Timestamp,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// TREE ENTITIES
// ============================================================================

/// Monitoring campaign; root of the tree and owner of one blob bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Project {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    /// Also used as the blob bucket name.
    pub name: String,
    pub name_zh: Option<String>,
    pub area: Option<String>,
    pub description: Option<String>,
    /// Set while a deferred audio cascade for this project is outstanding.
    pub pending_cascade: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    pub deletion: Option<Deletion>,
}

impl Project {
    pub fn bucket(&self) -> &str {
        &self.name
    }
}

/// Planned monitoring location inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Point {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub project_id: EntityId,
    pub name: String,
    pub gps_lat_plan: Option<f64>,
    pub gps_lon_plan: Option<f64>,
    pub depth_plan: Option<f64>,
    pub description: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    pub deletion: Option<Deletion>,
}

/// One placement of a recorder at a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Deployment {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub point_id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub recorder_id: EntityId,
    /// Sequential per point, assigned at creation.
    pub phase: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub start_time: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub end_time: Option<Timestamp>,
    pub status: DeploymentStatus,
    pub description: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    pub deletion: Option<Deletion>,
}

/// Recording file; its blob lives at `object_key` in the project bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Audio {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub deployment_id: EntityId,
    pub file_name: String,
    pub object_key: String,
    pub file_size: Option<i64>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub record_time: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub meta: Option<serde_json::Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    pub deletion: Option<Deletion>,
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Physical recorder unit, referenced by deployments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Recorder {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub brand: String,
    pub model: String,
    pub serial: String,
    pub sensitivity: f64,
    pub status: RecorderStatus,
    pub description: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    pub deletion: Option<Deletion>,
}

// ============================================================================
// LIFECYCLE IMPLS
// ============================================================================

impl Lifecycle for Project {
    const TIER: Tier = Tier::Project;

    fn id(&self) -> EntityId {
        self.id
    }

    fn parent_id(&self) -> Option<EntityId> {
        None
    }

    fn deletion(&self) -> Option<&Deletion> {
        self.deletion.as_ref()
    }

    fn set_deletion(&mut self, deletion: Option<Deletion>) {
        self.deletion = deletion;
    }

    fn identity_keys(&self) -> Vec<IdentityKey> {
        let mut keys = vec![IdentityKey::ProjectName {
            name: self.name.clone(),
        }];
        if let Some(name_zh) = &self.name_zh {
            keys.push(IdentityKey::ProjectLocalizedName {
                name_zh: name_zh.clone(),
            });
        }
        keys
    }
}

impl Lifecycle for Point {
    const TIER: Tier = Tier::Point;

    fn id(&self) -> EntityId {
        self.id
    }

    fn parent_id(&self) -> Option<EntityId> {
        Some(self.project_id)
    }

    fn deletion(&self) -> Option<&Deletion> {
        self.deletion.as_ref()
    }

    fn set_deletion(&mut self, deletion: Option<Deletion>) {
        self.deletion = deletion;
    }

    fn identity_keys(&self) -> Vec<IdentityKey> {
        vec![IdentityKey::PointName {
            project_id: self.project_id,
            name: self.name.clone(),
        }]
    }
}

impl Lifecycle for Deployment {
    const TIER: Tier = Tier::Deployment;

    fn id(&self) -> EntityId {
        self.id
    }

    fn parent_id(&self) -> Option<EntityId> {
        Some(self.point_id)
    }

    fn deletion(&self) -> Option<&Deletion> {
        self.deletion.as_ref()
    }

    fn set_deletion(&mut self, deletion: Option<Deletion>) {
        self.deletion = deletion;
    }

    fn identity_keys(&self) -> Vec<IdentityKey> {
        vec![IdentityKey::DeploymentPhase {
            point_id: self.point_id,
            phase: self.phase,
        }]
    }
}

impl Lifecycle for Audio {
    const TIER: Tier = Tier::Audio;

    fn id(&self) -> EntityId {
        self.id
    }

    fn parent_id(&self) -> Option<EntityId> {
        Some(self.deployment_id)
    }

    fn deletion(&self) -> Option<&Deletion> {
        self.deletion.as_ref()
    }

    fn set_deletion(&mut self, deletion: Option<Deletion>) {
        self.deletion = deletion;
    }

    fn identity_keys(&self) -> Vec<IdentityKey> {
        vec![IdentityKey::AudioObjectKey {
            object_key: self.object_key.clone(),
        }]
    }
}

impl Lifecycle for Recorder {
    const TIER: Tier = Tier::Recorder;

    fn id(&self) -> EntityId {
        self.id
    }

    fn parent_id(&self) -> Option<EntityId> {
        None
    }

    fn deletion(&self) -> Option<&Deletion> {
        self.deletion.as_ref()
    }

    fn set_deletion(&mut self, deletion: Option<Deletion>) {
        self.deletion = deletion;
    }

    fn identity_keys(&self) -> Vec<IdentityKey> {
        vec![IdentityKey::RecorderSerial {
            brand: self.brand.clone(),
            model: self.model.clone(),
            serial: self.serial.clone(),
        }]
    }
}

// ============================================================================
// RECORD
// ============================================================================

/// Any stored row, tagged by tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum Record {
    Project(Project),
    Point(Point),
    Deployment(Deployment),
    Audio(Audio),
    Recorder(Recorder),
}

macro_rules! dispatch {
    ($self:expr, $row:ident => $body:expr) => {
        match $self {
            Record::Project($row) => $body,
            Record::Point($row) => $body,
            Record::Deployment($row) => $body,
            Record::Audio($row) => $body,
            Record::Recorder($row) => $body,
        }
    };
}

impl Record {
    pub fn tier(&self) -> Tier {
        match self {
            Record::Project(_) => Tier::Project,
            Record::Point(_) => Tier::Point,
            Record::Deployment(_) => Tier::Deployment,
            Record::Audio(_) => Tier::Audio,
            Record::Recorder(_) => Tier::Recorder,
        }
    }

    pub fn id(&self) -> EntityId {
        dispatch!(self, row => row.id())
    }

    pub fn parent_id(&self) -> Option<EntityId> {
        dispatch!(self, row => row.parent_id())
    }

    pub fn deletion(&self) -> Option<&Deletion> {
        dispatch!(self, row => row.deletion())
    }

    pub fn set_deletion(&mut self, deletion: Option<Deletion>) {
        dispatch!(self, row => row.set_deletion(deletion))
    }

    pub fn identity_keys(&self) -> Vec<IdentityKey> {
        dispatch!(self, row => row.identity_keys())
    }

    pub fn is_deleted(&self) -> bool {
        self.deletion().is_some()
    }

    pub fn touch(&mut self, at: Timestamp) {
        dispatch!(self, row => row.updated_at = at)
    }
}

macro_rules! record_variant {
    ($ty:ident) => {
        impl From<$ty> for Record {
            fn from(row: $ty) -> Self {
                Record::$ty(row)
            }
        }

        impl TryFrom<Record> for $ty {
            type Error = Record;

            fn try_from(record: Record) -> Result<Self, Self::Error> {
                match record {
                    Record::$ty(row) => Ok(row),
                    other => Err(other),
                }
            }
        }
    };
}

record_variant!(Project);
record_variant!(Point);
record_variant!(Deployment);
record_variant!(Audio);
record_variant!(Recorder);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn project(name_zh: Option<&str>) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::now_v7(),
            name: "alpha".to_string(),
            name_zh: name_zh.map(str::to_string),
            area: None,
            description: None,
            pending_cascade: false,
            created_at: now,
            updated_at: now,
            deletion: None,
        }
    }

    #[test]
    fn test_project_reserves_localized_name_when_present() {
        assert_eq!(project(None).identity_keys().len(), 1);
        let keys = project(Some("海洋")).identity_keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&IdentityKey::ProjectLocalizedName {
            name_zh: "海洋".to_string()
        }));
    }

    #[test]
    fn test_record_set_deletion_round_trip() {
        let mut record = Record::from(project(None));
        assert!(!record.is_deleted());
        record.set_deletion(Some(Deletion::new(Utc::now(), Uuid::nil())));
        assert!(record.is_deleted());
        assert_eq!(record.tier(), Tier::Project);
        let back = Project::try_from(record).expect("project variant");
        assert!(back.is_deleted());
    }

    #[test]
    fn test_try_from_wrong_variant_returns_record() {
        let record = Record::from(project(None));
        assert!(Point::try_from(record).is_err());
    }

    #[cfg(feature = "openapi")]
    #[test]
    fn test_schema_documents_ids_and_timestamps_as_strings() {
        use utoipa::PartialSchema;

        let schema = serde_json::to_value(Deployment::schema()).expect("schema serializes");
        let props = &schema["properties"];
        assert_eq!(props["id"]["type"], "string");
        assert_eq!(props["id"]["format"], "uuid");
        assert_eq!(props["recorder_id"]["format"], "uuid");
        assert_eq!(props["created_at"]["format"], "date-time");
        assert_eq!(props["start_time"]["format"], "date-time");

        let schema = serde_json::to_value(Deletion::schema()).expect("schema serializes");
        assert_eq!(schema["properties"]["deleted_by"]["format"], "uuid");
    }
}
