//! Creates and updates for the Project → Point → Deployment → Audio tree.

use crate::engine::LifecycleEngine;
use crate::reservation::{changed_keys, ensure_available};
use serde::{Deserialize, Serialize};
use tidewatch_core::slug::project_name_from;
use tidewatch_core::{
    new_entity_id, Audio, Deployment, DeploymentStatus, EntityId, Lifecycle, LifecycleError,
    Point, Project, Record, StorageError, Tier, TidewatchResult, Timestamp, ValidationError,
};

// ============================================================================
// INPUTS
// ============================================================================

/// Input for [`LifecycleEngine::create_project`]. One of the names is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    /// Bucket-safe name. Derived from `name_zh` when absent.
    pub name: Option<String>,
    pub name_zh: Option<String>,
    pub area: Option<String>,
    pub description: Option<String>,
}

/// Fields of a project that may change after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name_zh: Option<String>,
    pub area: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPoint {
    pub project_id: EntityId,
    pub name: String,
    pub gps_lat_plan: Option<f64>,
    pub gps_lon_plan: Option<f64>,
    pub depth_plan: Option<f64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointUpdate {
    pub name: Option<String>,
    pub gps_lat_plan: Option<f64>,
    pub gps_lon_plan: Option<f64>,
    pub depth_plan: Option<f64>,
    pub description: Option<String>,
}

/// Input for [`LifecycleEngine::create_deployment`]. The phase is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDeployment {
    pub point_id: EntityId,
    pub recorder_id: EntityId,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub status: Option<DeploymentStatus>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAudio {
    pub deployment_id: EntityId,
    pub file_name: String,
    pub object_key: String,
    pub file_size: Option<i64>,
    pub record_time: Option<Timestamp>,
    pub meta: Option<serde_json::Value>,
}

// ============================================================================
// HELPERS
// ============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Narrow a record to its entity type.
pub(crate) fn expect_row<T>(record: Record, tier: Tier) -> Result<T, StorageError>
where
    T: TryFrom<Record, Error = Record>,
{
    T::try_from(record).map_err(|other| StorageError::Backend {
        reason: format!("expected {} row, got {}", tier, other.tier()),
    })
}

impl LifecycleEngine {
    /// Active row a new child or deployment points at.
    pub(crate) async fn require_reference(&self, tier: Tier, id: EntityId) -> TidewatchResult<Record> {
        self.gateway
            .find_active(tier, id)
            .await?
            .ok_or_else(|| LifecycleError::InactiveReference { tier, id }.into())
    }

    // ========================================================================
    // PROJECT
    // ========================================================================

    /// Create a project and, best effort, its bucket.
    pub async fn create_project(&self, input: NewProject) -> TidewatchResult<Project> {
        let name_zh = non_empty(input.name_zh);
        let name = match (non_empty(input.name), &name_zh) {
            (Some(name), _) => name,
            (None, Some(zh)) => project_name_from(zh),
            (None, None) => {
                return Err(ValidationError::RequiredFieldMissing {
                    field: "name".to_string(),
                }
                .into())
            }
        };

        let now = self.now();
        let project = Project {
            id: new_entity_id(),
            name,
            name_zh,
            area: non_empty(input.area),
            description: input.description,
            pending_cascade: false,
            created_at: now,
            updated_at: now,
            deletion: None,
        };

        ensure_available(self.gateway.as_ref(), &project.identity_keys(), None).await?;
        self.gateway.insert(&Record::Project(project.clone())).await?;

        let bucket = project.bucket();
        if let Err(e) = self.blob_call(bucket, self.blobs.create_bucket(bucket)).await {
            tracing::warn!(
                project_id = %project.id,
                bucket = %bucket,
                error = %e,
                "Failed to create project bucket"
            );
        }

        tracing::info!(project_id = %project.id, name = %project.name, "Project created");
        Ok(project)
    }

    pub async fn update_project(&self, id: EntityId, update: ProjectUpdate) -> TidewatchResult<Project> {
        let current: Project = expect_row(self.get_active(Tier::Project, id).await?, Tier::Project)?;
        let mut project = current.clone();
        if let Some(name_zh) = non_empty(update.name_zh) {
            project.name_zh = Some(name_zh);
        }
        if update.area.is_some() {
            project.area = non_empty(update.area);
        }
        if update.description.is_some() {
            project.description = update.description;
        }

        let keys = changed_keys(&current.identity_keys(), project.identity_keys());
        ensure_available(self.gateway.as_ref(), &keys, Some(id)).await?;

        project.updated_at = self.now();
        self.gateway.replace(&Record::Project(project.clone())).await?;
        Ok(project)
    }

    // ========================================================================
    // POINT
    // ========================================================================

    pub async fn create_point(&self, input: NewPoint) -> TidewatchResult<Point> {
        let name = required("name", &input.name)?;
        self.require_reference(Tier::Project, input.project_id).await?;

        let now = self.now();
        let point = Point {
            id: new_entity_id(),
            project_id: input.project_id,
            name,
            gps_lat_plan: input.gps_lat_plan,
            gps_lon_plan: input.gps_lon_plan,
            depth_plan: input.depth_plan,
            description: input.description,
            created_at: now,
            updated_at: now,
            deletion: None,
        };

        ensure_available(self.gateway.as_ref(), &point.identity_keys(), None).await?;
        self.gateway.insert(&Record::Point(point.clone())).await?;
        tracing::debug!(point_id = %point.id, project_id = %point.project_id, "Point created");
        Ok(point)
    }

    pub async fn update_point(&self, id: EntityId, update: PointUpdate) -> TidewatchResult<Point> {
        let current: Point = expect_row(self.get_active(Tier::Point, id).await?, Tier::Point)?;
        let mut point = current.clone();
        if let Some(name) = &update.name {
            point.name = required("name", name)?;
        }
        if update.gps_lat_plan.is_some() {
            point.gps_lat_plan = update.gps_lat_plan;
        }
        if update.gps_lon_plan.is_some() {
            point.gps_lon_plan = update.gps_lon_plan;
        }
        if update.depth_plan.is_some() {
            point.depth_plan = update.depth_plan;
        }
        if update.description.is_some() {
            point.description = update.description;
        }

        let keys = changed_keys(&current.identity_keys(), point.identity_keys());
        ensure_available(self.gateway.as_ref(), &keys, Some(id)).await?;

        point.updated_at = self.now();
        self.gateway.replace(&Record::Point(point.clone())).await?;
        Ok(point)
    }

    // ========================================================================
    // DEPLOYMENT
    // ========================================================================

    /// Create the next deployment of a point.
    ///
    /// The phase is one past the highest active phase. If a soft-deleted
    /// deployment still holds that phase the create is refused with
    /// `ReservedIdentifier`.
    pub async fn create_deployment(&self, input: NewDeployment) -> TidewatchResult<Deployment> {
        self.require_reference(Tier::Point, input.point_id).await?;
        self.require_reference(Tier::Recorder, input.recorder_id).await?;

        let phase = self
            .gateway
            .max_active_phase(input.point_id)
            .await?
            .map_or(1, |max| max + 1);

        let now = self.now();
        let deployment = Deployment {
            id: new_entity_id(),
            point_id: input.point_id,
            recorder_id: input.recorder_id,
            phase,
            start_time: input.start_time,
            end_time: input.end_time,
            status: input.status.unwrap_or_default(),
            description: input.description,
            created_at: now,
            updated_at: now,
            deletion: None,
        };

        ensure_available(self.gateway.as_ref(), &deployment.identity_keys(), None).await?;
        self.gateway
            .insert(&Record::Deployment(deployment.clone()))
            .await?;
        tracing::debug!(
            deployment_id = %deployment.id,
            point_id = %deployment.point_id,
            phase = deployment.phase,
            "Deployment created"
        );
        Ok(deployment)
    }

    // ========================================================================
    // AUDIO
    // ========================================================================

    pub async fn create_audio(&self, input: NewAudio) -> TidewatchResult<Audio> {
        let file_name = required("file_name", &input.file_name)?;
        let object_key = required("object_key", &input.object_key)?;
        self.require_reference(Tier::Deployment, input.deployment_id)
            .await?;

        let now = self.now();
        let audio = Audio {
            id: new_entity_id(),
            deployment_id: input.deployment_id,
            file_name,
            object_key,
            file_size: input.file_size,
            record_time: input.record_time,
            meta: input.meta,
            created_at: now,
            updated_at: now,
            deletion: None,
        };

        ensure_available(self.gateway.as_ref(), &audio.identity_keys(), None).await?;
        self.gateway.insert(&Record::Audio(audio.clone())).await?;
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidewatch_core::{IdentityKey, LifecycleConfig};
    use tidewatch_storage::{InMemoryBlobStore, InMemoryGateway};

    fn engine() -> (LifecycleEngine, InMemoryBlobStore) {
        let blobs = InMemoryBlobStore::new();
        let engine = LifecycleEngine::new(
            Arc::new(InMemoryGateway::new()),
            Arc::new(blobs.clone()),
            LifecycleConfig::default(),
        )
        .unwrap();
        (engine, blobs)
    }

    #[tokio::test]
    async fn test_project_name_derived_from_localized_name() {
        let (engine, blobs) = engine();
        let project = engine
            .create_project(NewProject {
                name_zh: Some("Kenting Reef 2024".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(project.name, "kenting-reef-2024");
        assert!(blobs.has_bucket("kenting-reef-2024"));
    }

    #[tokio::test]
    async fn test_localized_name_is_transliterated() {
        let (engine, _) = engine();
        let project = engine
            .create_project(NewProject {
                name_zh: Some("海洋風場".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(project.name, "hai-yang-feng-chang");
        assert_eq!(project.name_zh.as_deref(), Some("海洋風場"));
    }

    #[tokio::test]
    async fn test_unsluggable_localized_name_falls_back() {
        let (engine, _) = engine();
        let project = engine
            .create_project(NewProject {
                name_zh: Some("！！".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(project.name.starts_with("project-"));
        assert_eq!(project.name.len(), "project-".len() + 6);
    }

    #[tokio::test]
    async fn test_project_requires_a_name() {
        let (engine, _) = engine();
        let err = engine
            .create_project(NewProject::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            tidewatch_core::TidewatchError::Validation(ValidationError::RequiredFieldMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_point_requires_active_project() {
        let (engine, _) = engine();
        let missing = new_entity_id();
        let err = engine
            .create_point(NewPoint {
                project_id: missing,
                name: "p1".to_string(),
                gps_lat_plan: None,
                gps_lon_plan: None,
                depth_plan: None,
                description: None,
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.as_lifecycle(),
            Some(&LifecycleError::InactiveReference {
                tier: Tier::Project,
                id: missing
            })
        );
    }

    #[tokio::test]
    async fn test_update_point_rename_conflict() {
        let (engine, _) = engine();
        let project = engine
            .create_project(NewProject {
                name: Some("alpha".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let new_point = |name: &str| NewPoint {
            project_id: project.id,
            name: name.to_string(),
            gps_lat_plan: None,
            gps_lon_plan: None,
            depth_plan: None,
            description: None,
        };
        engine.create_point(new_point("p1")).await.unwrap();
        let p2 = engine.create_point(new_point("p2")).await.unwrap();

        let err = engine
            .update_point(
                p2.id,
                PointUpdate {
                    name: Some("p1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.as_lifecycle(),
            Some(&LifecycleError::ActiveUniquenessConflict {
                key: IdentityKey::PointName {
                    project_id: project.id,
                    name: "p1".to_string()
                }
            })
        );

        // Unchanged name passes.
        let updated = engine
            .update_point(
                p2.id,
                PointUpdate {
                    name: Some("p2".to_string()),
                    depth_plan: Some(12.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.depth_plan, Some(12.5));
    }
}
