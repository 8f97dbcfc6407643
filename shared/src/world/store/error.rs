use thiserror::Error;

use crate::{ComponentKind, EntityId, Version};

/// Errors that can occur during component store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Entity was inserted twice
    #[error("Entity {entity} already exists in the component store")]
    EntityAlreadyExists { entity: EntityId },

    /// Entity has been deleted, its identifier is never reused
    #[error("Entity {entity} is tombstoned, writes to it are dropped")]
    EntityTombstoned { entity: EntityId },

    /// Entity was never inserted (or has been evicted from this view)
    #[error("Entity {entity} not found in the component store")]
    EntityNotFound { entity: EntityId },

    /// Write carried a version that is not newer than the stored one
    #[error("Stale write to {entity}/{kind}: version {attempted} is not newer than stored version {stored}")]
    StaleWrite {
        entity: EntityId,
        kind: ComponentKind,
        stored: Version,
        attempted: Version,
    },
}
