use thiserror::Error;

use mosaic_shared::{AuthorityError, ComponentKind, EntityId};

/// Errors returned by the worker's application-facing operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    /// The coordinator has not assigned this worker an id yet
    #[error("Worker has not been welcomed by the coordinator yet")]
    NotWelcomed,

    /// The session is closed, nothing can be sent anymore
    #[error("Connection to the coordinator was lost")]
    ConnectionLost,

    /// Mutation attempted without ownership
    #[error(transparent)]
    Authority(#[from] AuthorityError),

    /// No reserved entity id is left, a refresh is pending
    #[error("Entity id pool is empty")]
    PoolExhausted,

    /// The entity is not in this worker's view
    #[error("{entity} is not visible to this worker")]
    NotVisible { entity: EntityId },

    /// A component kind missing from the protocol was supplied
    #[error("Component kind {kind} is not registered in the protocol")]
    UnknownComponent { kind: ComponentKind },
}
