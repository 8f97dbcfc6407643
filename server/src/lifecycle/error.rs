use thiserror::Error;

use mosaic_shared::{AuthorityError, ComponentKind, EntityId, StoreError, WorkerId};

/// Errors that can occur while creating, reserving or deleting entities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// A reservation asked for zero ids or more than one request may hold
    #[error("Invalid reservation size {count} requested by {worker}")]
    InvalidReservation { worker: WorkerId, count: u32 },

    /// The monotonic allocator cannot hand out another range
    #[error("Entity id space exhausted, {requested} ids requested")]
    IdSpaceExhausted { requested: u32 },

    /// The id was never reserved by this worker
    #[error("{entity} is not reserved by {worker}")]
    NotReserved { entity: EntityId, worker: WorkerId },

    /// The id was reserved by this worker but the reservation lapsed
    #[error("Reservation of {entity} by {worker} expired")]
    ReservationExpired { entity: EntityId, worker: WorkerId },

    /// The id was already used to create an entity
    #[error("{entity} was already created")]
    AlreadyClaimed { entity: EntityId },

    /// The entity is deleted and waiting to be retired
    #[error("{entity} is deleted and draining")]
    EntityDraining { entity: EntityId },

    /// The entity does not exist in the coordinator's view
    #[error("{entity} does not exist")]
    EntityNotFound { entity: EntityId },

    /// Another worker holds authority over part of the entity
    #[error("{worker} may not delete {entity}, authority held by {holder}")]
    DeleteNotPermitted {
        entity: EntityId,
        worker: WorkerId,
        holder: WorkerId,
    },

    /// The entity is not in the worker's view
    #[error("{entity} is not visible to {worker}")]
    NotVisible { entity: EntityId, worker: WorkerId },

    /// A component kind missing from the protocol was supplied
    #[error("Component kind {kind} is not registered in the protocol")]
    UnknownComponent { kind: ComponentKind },

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
