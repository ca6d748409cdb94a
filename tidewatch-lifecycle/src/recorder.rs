//! Recorder registry.
//!
//! Recorders sit outside the project tree. Soft delete and restore touch the
//! single row; hard delete is refused while any deployment references it.

use crate::engine::LifecycleEngine;
use crate::reservation::{changed_keys, ensure_available};
use crate::tiers::expect_row;
use serde::{Deserialize, Serialize};
use tidewatch_core::{
    new_entity_id, EntityId, Lifecycle, Record, Recorder, RecorderStatus, Tier, TidewatchResult,
    ValidationError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecorder {
    pub brand: String,
    pub model: String,
    pub serial: String,
    pub sensitivity: f64,
    pub status: Option<RecorderStatus>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecorderUpdate {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub sensitivity: Option<f64>,
    pub status: Option<RecorderStatus>,
    pub description: Option<String>,
}

fn identifier(field: &str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn sensitivity(value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::InvalidValue {
            field: "sensitivity".to_string(),
            reason: format!("{} is not a finite number", value),
        });
    }
    Ok(value)
}

impl LifecycleEngine {
    /// Register a recorder. `(brand, model, serial)` must be free.
    pub async fn create_recorder(&self, input: NewRecorder) -> TidewatchResult<Recorder> {
        let now = self.now();
        let recorder = Recorder {
            id: new_entity_id(),
            brand: identifier("brand", &input.brand)?,
            model: identifier("model", &input.model)?,
            serial: identifier("serial", &input.serial)?,
            sensitivity: sensitivity(input.sensitivity)?,
            status: input.status.unwrap_or_default(),
            description: input.description,
            created_at: now,
            updated_at: now,
            deletion: None,
        };

        ensure_available(self.gateway.as_ref(), &recorder.identity_keys(), None).await?;
        self.gateway
            .insert(&Record::Recorder(recorder.clone()))
            .await?;
        tracing::info!(
            recorder_id = %recorder.id,
            brand = %recorder.brand,
            model = %recorder.model,
            serial = %recorder.serial,
            "Recorder registered"
        );
        Ok(recorder)
    }

    pub async fn update_recorder(
        &self,
        id: EntityId,
        update: RecorderUpdate,
    ) -> TidewatchResult<Recorder> {
        let current: Recorder =
            expect_row(self.get_active(Tier::Recorder, id).await?, Tier::Recorder)?;
        let mut recorder = current.clone();
        if let Some(brand) = &update.brand {
            recorder.brand = identifier("brand", brand)?;
        }
        if let Some(model) = &update.model {
            recorder.model = identifier("model", model)?;
        }
        if let Some(serial) = &update.serial {
            recorder.serial = identifier("serial", serial)?;
        }
        if let Some(value) = update.sensitivity {
            recorder.sensitivity = sensitivity(value)?;
        }
        if let Some(status) = update.status {
            recorder.status = status;
        }
        if update.description.is_some() {
            recorder.description = update.description;
        }

        let keys = changed_keys(&current.identity_keys(), recorder.identity_keys());
        ensure_available(self.gateway.as_ref(), &keys, Some(id)).await?;

        recorder.updated_at = self.now();
        self.gateway
            .replace(&Record::Recorder(recorder.clone()))
            .await?;
        Ok(recorder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidewatch_core::{IdentityKey, LifecycleConfig, LifecycleError, TidewatchError};
    use tidewatch_storage::{InMemoryBlobStore, InMemoryGateway};
    use uuid::Uuid;

    fn engine() -> LifecycleEngine {
        LifecycleEngine::new(
            Arc::new(InMemoryGateway::new()),
            Arc::new(InMemoryBlobStore::new()),
            LifecycleConfig::default(),
        )
        .unwrap()
    }

    fn new_recorder(serial: &str) -> NewRecorder {
        NewRecorder {
            brand: "Ocean Instruments".to_string(),
            model: "SoundTrap ST600".to_string(),
            serial: serial.to_string(),
            sensitivity: -176.2,
            status: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_register_defaults_to_in_service() {
        let engine = engine();
        let recorder = engine.create_recorder(new_recorder("SN-001")).await.unwrap();
        assert_eq!(recorder.status, RecorderStatus::InService);
        assert!(!recorder.is_deleted());
    }

    #[tokio::test]
    async fn test_serial_triple_conflict_then_reserved() {
        let engine = engine();
        let first = engine.create_recorder(new_recorder("SN-001")).await.unwrap();

        let err = engine
            .create_recorder(new_recorder("SN-001"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_lifecycle(),
            Some(LifecycleError::ActiveUniquenessConflict { .. })
        ));

        engine
            .soft_delete(Tier::Recorder, first.id, Uuid::now_v7())
            .await
            .unwrap();
        let err = engine
            .create_recorder(new_recorder("SN-001"))
            .await
            .unwrap_err();
        assert_eq!(
            err.as_lifecycle(),
            Some(&LifecycleError::ReservedIdentifier {
                key: IdentityKey::RecorderSerial {
                    brand: "Ocean Instruments".to_string(),
                    model: "SoundTrap ST600".to_string(),
                    serial: "SN-001".to_string(),
                }
            })
        );
    }

    #[tokio::test]
    async fn test_update_changes_status_and_checks_triple() {
        let engine = engine();
        engine.create_recorder(new_recorder("SN-001")).await.unwrap();
        let second = engine.create_recorder(new_recorder("SN-002")).await.unwrap();

        let err = engine
            .update_recorder(
                second.id,
                RecorderUpdate {
                    serial: Some("SN-001".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_lifecycle(),
            Some(LifecycleError::ActiveUniquenessConflict { .. })
        ));

        let updated = engine
            .update_recorder(
                second.id,
                RecorderUpdate {
                    status: Some(RecorderStatus::UnderRepair),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, RecorderStatus::UnderRepair);
    }

    #[tokio::test]
    async fn test_rejects_blank_serial_and_nan_sensitivity() {
        let engine = engine();
        let err = engine.create_recorder(new_recorder("  ")).await.unwrap_err();
        assert!(matches!(err, TidewatchError::Validation(_)));

        let mut input = new_recorder("SN-009");
        input.sensitivity = f64::NAN;
        let err = engine.create_recorder(input).await.unwrap_err();
        assert!(matches!(
            err,
            TidewatchError::Validation(ValidationError::InvalidValue { .. })
        ));
    }
}
