use thiserror::Error;

use crate::{CommandId, ComponentKind, EntityId, RpcSequence};

/// Errors reported by the RPC router
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// A reliable RPC was not acknowledged within the retry budget and was dropped
    #[error("RPC {command} (seq {sequence}) to {target}/{kind} timed out after {attempts} attempts")]
    Timeout {
        target: EntityId,
        kind: ComponentKind,
        command: CommandId,
        sequence: RpcSequence,
        attempts: u32,
    },

    /// The router was cleared while the RPC was still outstanding
    #[error("RPC {command} (seq {sequence}) to {target}/{kind} cancelled by connection teardown")]
    Cancelled {
        target: EntityId,
        kind: ComponentKind,
        command: CommandId,
        sequence: RpcSequence,
    },
}

impl RpcError {
    pub fn target(&self) -> EntityId {
        match self {
            Self::Timeout { target, .. } | Self::Cancelled { target, .. } => *target,
        }
    }
}
