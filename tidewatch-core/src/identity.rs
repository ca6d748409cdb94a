//! Identity types for Tidewatch entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Opaque identifier of the acting user, supplied by the identity provider.
pub type ActorId = Uuid;

/// Identifier shared by every row tombstoned in one cascade call.
pub type CascadeGroupId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Generate a new cascade group id.
pub fn new_cascade_group() -> CascadeGroupId {
    Uuid::now_v7()
}
