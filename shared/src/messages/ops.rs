use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    messages::rpc::RpcEnvelope, world::interest::InterestQuery, AuthoritySequence, ComponentData,
    ComponentKind, ComponentSetId, EntityId, RpcSequence, WorkerId,
};

/// Coordinator → worker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DownstreamOp {
    /// First op on every connection
    Welcome { worker: WorkerId },
    AddEntity { entity: EntityId },
    AddComponent { entity: EntityId, component: ComponentData },
    UpdateComponent { entity: EntityId, component: ComponentData },
    RemoveComponent { entity: EntityId, kind: ComponentKind },
    /// The coordinator's state of a component after it rejected a write from
    /// this worker. Replaces the local state whatever its version.
    ResetComponent { entity: EntityId, component: ComponentData },
    /// Ends the staging of an entity opened by `AddEntity`
    InitialStateComplete { entity: EntityId },
    /// `deleted` is false when the entity only left this worker's interest
    RemoveEntity { entity: EntityId, deleted: bool },
    AuthorityChange {
        entity: EntityId,
        set: ComponentSetId,
        authoritative: bool,
        sequence: AuthoritySequence,
    },
    AuthorityDenied { entity: EntityId, set: ComponentSetId },
    Rpc { sender: WorkerId, envelope: RpcEnvelope },
    RpcAck { target: EntityId, kind: ComponentKind, sequence: RpcSequence },
    /// `count` ids from `first`, claimable for `ttl`. Zero ids when refused.
    ReserveEntityIdsResponse { first: EntityId, count: u32, ttl: Duration },
    CreateEntityResponse { entity: EntityId, accepted: bool },
    DeleteEntityResponse { entity: EntityId, accepted: bool },
    /// Another worker disconnected, its RPC streams are finished
    WorkerLeft { worker: WorkerId },
}

impl DownstreamOp {
    /// The entity whose view this op changes, for ops handled by the view
    /// delta computer
    pub fn view_entity(&self) -> Option<EntityId> {
        match self {
            Self::AddEntity { entity }
            | Self::AddComponent { entity, .. }
            | Self::UpdateComponent { entity, .. }
            | Self::RemoveComponent { entity, .. }
            | Self::ResetComponent { entity, .. }
            | Self::InitialStateComplete { entity }
            | Self::RemoveEntity { entity, .. }
            | Self::AuthorityChange { entity, .. } => Some(*entity),
            _ => None,
        }
    }
}

/// Worker → coordinator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum UpstreamOp {
    AddComponent { entity: EntityId, component: ComponentData },
    UpdateComponent { entity: EntityId, component: ComponentData },
    RemoveComponent { entity: EntityId, kind: ComponentKind },
    RequestAuthority { entity: EntityId, set: ComponentSetId },
    ReleaseAuthority { entity: EntityId, set: ComponentSetId },
    SetInterest { queries: Vec<InterestQuery> },
    Rpc(RpcEnvelope),
    /// Acknowledges RPCs received from `sender`
    RpcAck {
        sender: WorkerId,
        target: EntityId,
        kind: ComponentKind,
        sequence: RpcSequence,
    },
    ReserveEntityIds { count: u32 },
    CreateEntity { entity: EntityId, components: Vec<ComponentData> },
    DeleteEntity { entity: EntityId },
}

impl UpstreamOp {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Self::AddComponent { entity, .. }
            | Self::UpdateComponent { entity, .. }
            | Self::RemoveComponent { entity, .. }
            | Self::RequestAuthority { entity, .. }
            | Self::ReleaseAuthority { entity, .. }
            | Self::RpcAck { target: entity, .. }
            | Self::CreateEntity { entity, .. }
            | Self::DeleteEntity { entity } => Some(*entity),
            Self::Rpc(envelope) => Some(envelope.target),
            Self::SetInterest { .. } | Self::ReserveEntityIds { .. } => None,
        }
    }
}
