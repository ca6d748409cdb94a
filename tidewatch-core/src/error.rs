//! Error types for Tidewatch operations

use crate::{EntityId, IdentityKey, Tier};
use std::time::Duration;
use thiserror::Error;

/// Lifecycle rule violations returned to the caller of an engine operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{tier} not found: {id}")]
    NotFound { tier: Tier, id: EntityId },

    #[error("An active row already holds {key}")]
    ActiveUniquenessConflict { key: IdentityKey },

    #[error("Identifier reserved by a deleted row: {key}; hard delete it to release the key")]
    ReservedIdentifier { key: IdentityKey },

    #[error(
        "Cannot delete recorder {recorder_id}: {count} active deployment(s) and {tombstoned} deleted deployment(s) reference it"
    )]
    ReferentialBlock {
        recorder_id: EntityId,
        count: u64,
        tombstoned: u64,
    },

    #[error("Referenced {tier} {id} is missing or deleted")]
    InactiveReference { tier: Tier, id: EntityId },
}

/// Persistence gateway errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Row not found: {tier} with id {id}")]
    NotFound { tier: Tier, id: EntityId },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },

    #[error("Cascade job not pending: {job_id}")]
    CascadeJobMissing { job_id: EntityId },

    #[error("Invalid predicate: {reason}")]
    InvalidPredicate { reason: String },

    #[error("Backend error: {reason}")]
    Backend { reason: String },

    #[error("Connection pool error: {reason}")]
    Pool { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Blob store errors. Never fatal to a hard delete.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("Failed to delete {keys} object(s) from bucket {bucket}: {reason}")]
    StorageDeletionFailure {
        bucket: String,
        keys: usize,
        reason: String,
    },

    #[error("Bucket operation failed for {bucket}: {reason}")]
    Bucket { bucket: String, reason: String },

    #[error("Blob call on bucket {bucket} timed out after {after:?}")]
    Timeout { bucket: String, after: Duration },

    #[error("Batch of {size} keys exceeds the limit of {max}")]
    BatchTooLarge { size: usize, max: usize },
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Tidewatch errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TidewatchError {
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TidewatchError {
    /// The lifecycle rule that failed, if this is a rule violation.
    pub fn as_lifecycle(&self) -> Option<&LifecycleError> {
        match self {
            TidewatchError::Lifecycle(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for Tidewatch operations.
pub type TidewatchResult<T> = Result<T, TidewatchError>;
