//! Tidewatch Storage - Persistence and Blob Gateways
//!
//! Defines the predicate-based persistence gateway the lifecycle engine
//! drives, an in-memory implementation used by tests and local runs, the
//! PostgreSQL implementation, and the object-store gateway for audio blobs.

pub mod blob;
pub mod gateway;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "s3")]
pub mod s3;

pub use blob::{BlobStore, InMemoryBlobStore};
pub use gateway::{
    CascadeJob, LifecycleChange, OpOutcome, Page, PersistenceGateway, PurgePlan, ReferenceCount,
    StateFilter, TierCounts, TierPredicate, TreeScope, WriteBatch, WriteOp,
};
pub use memory::InMemoryGateway;

#[cfg(feature = "postgres")]
pub use postgres::{DbConfig, PgGateway, SCHEMA_SQL};

#[cfg(feature = "s3")]
pub use s3::{S3BlobStore, S3Config};
