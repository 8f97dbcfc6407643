use thiserror::Error;

use crate::{AuthoritySequence, ComponentKind, ComponentSetId, EntityId, WorkerId};

/// Errors that can occur during authority operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// Entity has no authority record
    #[error("Entity {entity} not registered with the AuthorityManager (operation: {operation})")]
    EntityNotRegistered {
        entity: EntityId,
        operation: &'static str,
    },

    /// Attempted to register an entity twice
    #[error("Entity {entity} is already registered with the AuthorityManager")]
    EntityAlreadyRegistered { entity: EntityId },

    /// Entity is deleted, authority can no longer change
    #[error("Entity {entity} is tombstoned")]
    EntityTombstoned { entity: EntityId },

    /// Component set was never registered with the Protocol
    #[error("Component set {set} not registered with Protocol")]
    UnknownSet { set: ComponentSetId },

    /// Requester has no interest in the entity, authority implies interest
    #[error("Worker {worker} has no interest in {entity}, authority over {set} rejected")]
    NoInterest {
        entity: EntityId,
        set: ComponentSetId,
        worker: WorkerId,
    },

    /// Transition sequence is not newer than the last applied one
    #[error("Stale authority transition for {entity}: sequence {attempted} <= last applied {last_applied}")]
    StaleSequence {
        entity: EntityId,
        last_applied: AuthoritySequence,
        attempted: AuthoritySequence,
    },

    /// Another worker holds or is being granted authority
    #[error("Authority over {entity}/{set} is held or pending for {holder}")]
    Contended {
        entity: EntityId,
        set: ComponentSetId,
        holder: WorkerId,
    },

    /// Transition requires a state the record is not in
    #[error("Authority over {entity}/{set} cannot {operation} from its current state")]
    InvalidTransition {
        entity: EntityId,
        set: ComponentSetId,
        operation: &'static str,
    },

    /// Write attempted without holding authority
    #[error("Worker {worker} is not authoritative over {entity}/{kind}")]
    NotAuthoritative {
        entity: EntityId,
        kind: ComponentKind,
        worker: WorkerId,
    },

    /// Kind is write-protected, only the coordinator mutates it
    #[error("Component {kind} on {entity} is coordinator-owned")]
    CoordinatorOwned { entity: EntityId, kind: ComponentKind },
}
