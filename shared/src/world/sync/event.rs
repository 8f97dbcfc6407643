use crate::{
    messages::rpc::RpcError, CommandId, ComponentData, ComponentKind, ComponentSetId, EntityId,
    WorkerId,
};

/// Application-visible change to a worker's view, in the order it must be observed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewEvent {
    EntityAdded {
        entity: EntityId,
        components: Vec<ComponentData>,
    },
    ComponentAdded {
        entity: EntityId,
        component: ComponentData,
    },
    ComponentUpdated {
        entity: EntityId,
        component: ComponentData,
    },
    ComponentRemoved {
        entity: EntityId,
        kind: ComponentKind,
    },
    /// `deleted` is false when the entity only left this worker's interest
    EntityRemoved {
        entity: EntityId,
        deleted: bool,
    },
    AuthorityChanged {
        entity: EntityId,
        kind: ComponentKind,
        has_authority: bool,
    },
    AuthorityDenied {
        entity: EntityId,
        set: ComponentSetId,
    },
    /// Buffered local writes dropped because authority over `set` was lost
    WritesDiscarded {
        entity: EntityId,
        set: ComponentSetId,
        count: usize,
    },
    RpcReceived {
        entity: EntityId,
        kind: ComponentKind,
        command: CommandId,
        payload: Vec<u8>,
        sender: WorkerId,
    },
    RpcFailed(RpcError),
    /// Outcome of a `create_entity` round trip
    EntityCreated {
        entity: EntityId,
        accepted: bool,
    },
}

impl ViewEvent {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Self::EntityAdded { entity, .. }
            | Self::ComponentAdded { entity, .. }
            | Self::ComponentUpdated { entity, .. }
            | Self::ComponentRemoved { entity, .. }
            | Self::EntityRemoved { entity, .. }
            | Self::AuthorityChanged { entity, .. }
            | Self::AuthorityDenied { entity, .. }
            | Self::WritesDiscarded { entity, .. }
            | Self::RpcReceived { entity, .. }
            | Self::EntityCreated { entity, .. } => Some(*entity),
            Self::RpcFailed(error) => Some(error.target()),
        }
    }
}
