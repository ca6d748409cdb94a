//! Shared defaults and hard limits.

/// Tolerance used to correlate descendants with a restored ancestor.
pub const DEFAULT_RESTORE_WINDOW_SECS: u64 = 5;

/// Widest accepted restore window tolerance (one day).
pub const MAX_RESTORE_WINDOW_SECS: u64 = 86_400;

/// Object-store limit on keys per multi-object delete call.
pub const MAX_BLOB_BATCH_SIZE: usize = 1000;

pub const DEFAULT_BLOB_BATCH_SIZE: usize = MAX_BLOB_BATCH_SIZE;

pub const DEFAULT_BLOB_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_CASCADE_SWEEP_INTERVAL_SECS: u64 = 30;

pub const DEFAULT_CASCADE_BATCH_SIZE: usize = 16;

pub const DEFAULT_CASCADE_CHANNEL_CAPACITY: usize = 256;

/// Longest slug derived from a localized project name.
pub const SLUG_MAX_LEN: usize = 50;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;

pub const MAX_PAGE_LIMIT: u32 = 500;
