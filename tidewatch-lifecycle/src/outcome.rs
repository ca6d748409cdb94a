//! Results of the cascade operations.

use serde::{Deserialize, Serialize};
use tidewatch_core::Record;
use tidewatch_storage::{CascadeJob, TierCounts};

/// Result of a soft delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeOutcome {
    /// The target after the cascade committed.
    pub snapshot: Record,
    /// Rows tombstoned synchronously, per tier.
    pub affected: TierCounts,
    /// Audio fan-out handed to the dispatcher, for project targets.
    pub deferred_job: Option<CascadeJob>,
}

/// Result of a cascade restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub snapshot: Record,
    pub restored: TierCounts,
    /// Matching rows left deleted because an active row holds their key.
    pub skipped: TierCounts,
}

impl RestoreOutcome {
    /// Outcome for a target that was already active.
    pub fn unchanged(snapshot: Record) -> Self {
        Self {
            snapshot,
            restored: TierCounts::default(),
            skipped: TierCounts::default(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.restored.total() == 0
    }
}

/// Diagnostics of a hard delete.
///
/// Blob failures never fail the operation; they are only counted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Rows removed, per tier.
    pub removed: TierCounts,
    /// Audio rows removed.
    pub deleted_leaf_count: u64,
    /// Blob delete calls issued.
    pub blob_batches: usize,
    pub failed_blob_batches: usize,
    pub failed_blob_keys: usize,
    /// Whether the project bucket was removed (project targets only).
    pub bucket_removed: bool,
}

impl PurgeReport {
    pub fn blob_failures(&self) -> bool {
        self.failed_blob_batches > 0
    }
}
