use serde::{Deserialize, Serialize};

use crate::{CommandId, ComponentKind, EntityId, RpcSequence};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReliabilityTier {
    /// Retained and retransmitted until acknowledged, delivered in send order
    /// per (entity, component kind)
    Reliable,
    /// Sent once, may be lost
    Unreliable,
}

/// A single RPC addressed to the worker holding authority over
/// (`target`, set of `kind`)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEnvelope {
    pub target: EntityId,
    pub kind: ComponentKind,
    pub command: CommandId,
    pub payload: Vec<u8>,
    pub tier: ReliabilityTier,
    /// Zero for unreliable envelopes
    pub sequence: RpcSequence,
    /// Lowest sequence the sender still retains for this stream. The receiver
    /// never waits for anything below it.
    pub stream_floor: RpcSequence,
}

impl RpcEnvelope {
    pub fn is_reliable(&self) -> bool {
        self.tier == ReliabilityTier::Reliable
    }
}
