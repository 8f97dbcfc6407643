use thiserror::Error;

use mosaic_shared::{AuthorityError, StoreError, WorkerId};

use crate::lifecycle::LifecycleError;

/// Errors returned by the coordinator's application-facing operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Unknown worker {worker}")]
    UnknownWorker { worker: WorkerId },

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
