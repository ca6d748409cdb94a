//! Tidewatch Core - Entity and lifecycle types
//!
//! Data structures shared by the storage gateways and the cascade engine:
//! the five entity kinds, their soft-delete tombstones, the identifying keys
//! they reserve, and the error taxonomy.

pub mod clock;
pub mod config;
pub mod constants;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod slug;

pub use clock::{Clock, SystemClock};
pub use config::{LifecycleConfig, RestoreMatch};
pub use entities::{Audio, Deployment, Point, Project, Record, Recorder};
pub use enums::{DeploymentStatus, RecorderStatus, Tier};
pub use error::{
    BlobError, ConfigError, LifecycleError, StorageError, TidewatchError, TidewatchResult,
    ValidationError,
};
pub use identity::{
    new_cascade_group, new_entity_id, ActorId, CascadeGroupId, EntityId, Timestamp,
};
pub use lifecycle::{Deletion, IdentityKey, Lifecycle};
