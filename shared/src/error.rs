use thiserror::Error;

use crate::{
    connection::DecoderError, messages::rpc::RpcError, transport::RecvError,
    transport::SendError, world::delegation::AuthorityError, world::store::StoreError,
    CommandId, ComponentKind, EntityId, RpcSequence, Version,
};

/// Error taxonomy of the sync core. Only `ConnectionLost` is ever surfaced as
/// fatal to a connection; the rest affect a single write, message or call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Version or sequence too old, the write was dropped
    #[error("Stale write to {entity}/{kind}: version {attempted} is not newer than {stored}")]
    StaleWrite {
        entity: EntityId,
        kind: ComponentKind,
        stored: Version,
        attempted: Version,
    },

    /// Mutation attempted without ownership
    #[error("Authority error: {0}")]
    Authority(#[from] AuthorityError),

    /// Reliable RPC exceeded its retry budget
    #[error("RPC {command} (seq {sequence}) to {target}/{kind} timed out")]
    RpcTimeout {
        target: EntityId,
        kind: ComponentKind,
        command: CommandId,
        sequence: RpcSequence,
    },

    /// Inbound message could not be parsed and was discarded
    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] DecoderError),

    /// The connection session closed
    #[error("Connection lost")]
    ConnectionLost,

    /// Any other component store failure
    #[error("Component store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SyncError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::StaleWrite {
                entity,
                kind,
                stored,
                attempted,
            } => Self::StaleWrite {
                entity,
                kind,
                stored,
                attempted,
            },
            other => Self::Store(other),
        }
    }
}

impl From<RpcError> for SyncError {
    fn from(error: RpcError) -> Self {
        match error {
            RpcError::Timeout {
                target,
                kind,
                command,
                sequence,
                ..
            } => Self::RpcTimeout {
                target,
                kind,
                command,
                sequence,
            },
            // teardown cancellations only happen once the connection is gone
            RpcError::Cancelled { .. } => Self::ConnectionLost,
        }
    }
}

impl From<SendError> for SyncError {
    fn from(_: SendError) -> Self {
        Self::ConnectionLost
    }
}

impl From<RecvError> for SyncError {
    fn from(_: RecvError) -> Self {
        Self::ConnectionLost
    }
}
