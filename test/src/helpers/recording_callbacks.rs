use mosaic_shared::{
    CommandId, ComponentData, ComponentKind, ComponentSetId, EntityId, RpcError, ViewCallbacks,
};

/// One callback invocation, as observed by the application
#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    EntityAdded(EntityId, Vec<ComponentData>),
    ComponentAdded(EntityId, ComponentKind),
    ComponentUpdated(EntityId, ComponentKind, Vec<u8>),
    ComponentRemoved(EntityId, ComponentKind),
    EntityRemoved(EntityId),
    AuthorityChanged(EntityId, ComponentKind, bool),
    AuthorityDenied(EntityId, ComponentSetId),
    WritesDiscarded(EntityId, ComponentSetId, usize),
    RpcReceived(EntityId, ComponentKind, CommandId, Vec<u8>),
    RpcFailed(RpcError),
    EntityCreated(EntityId, bool),
}

impl Recorded {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            Self::EntityAdded(entity, _)
            | Self::ComponentAdded(entity, _)
            | Self::ComponentUpdated(entity, _, _)
            | Self::ComponentRemoved(entity, _)
            | Self::EntityRemoved(entity)
            | Self::AuthorityChanged(entity, _, _)
            | Self::AuthorityDenied(entity, _)
            | Self::WritesDiscarded(entity, _, _)
            | Self::RpcReceived(entity, _, _, _)
            | Self::EntityCreated(entity, _) => Some(*entity),
            Self::RpcFailed(error) => Some(error.target()),
        }
    }
}

/// [`ViewCallbacks`] that keeps every invocation in order
#[derive(Default)]
pub struct RecordingCallbacks {
    recorded: Vec<Recorded>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> &[Recorded] {
        &self.recorded
    }

    pub fn take(&mut self) -> Vec<Recorded> {
        std::mem::take(&mut self.recorded)
    }

    pub fn clear(&mut self) {
        self.recorded.clear();
    }

    /// Everything recorded for `entity`, in order
    pub fn for_entity(&self, entity: EntityId) -> Vec<Recorded> {
        self.recorded
            .iter()
            .filter(|recorded| recorded.entity() == Some(entity))
            .cloned()
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Recorded) -> bool) -> usize {
        self.recorded.iter().filter(|recorded| predicate(recorded)).count()
    }

    /// Payloads of every RPC received with `command`, in delivery order
    pub fn rpc_payloads(&self, command: CommandId) -> Vec<Vec<u8>> {
        self.recorded
            .iter()
            .filter_map(|recorded| match recorded {
                Recorded::RpcReceived(_, _, received, payload) if *received == command => {
                    Some(payload.clone())
                }
                _ => None,
            })
            .collect()
    }
}

impl ViewCallbacks for RecordingCallbacks {
    fn on_entity_added(&mut self, entity: EntityId, components: &[ComponentData]) {
        self.recorded
            .push(Recorded::EntityAdded(entity, components.to_vec()));
    }

    fn on_component_added(&mut self, entity: EntityId, component: &ComponentData) {
        self.recorded
            .push(Recorded::ComponentAdded(entity, component.kind));
    }

    fn on_component_updated(&mut self, entity: EntityId, kind: ComponentKind, state: &[u8]) {
        self.recorded
            .push(Recorded::ComponentUpdated(entity, kind, state.to_vec()));
    }

    fn on_component_removed(&mut self, entity: EntityId, kind: ComponentKind) {
        self.recorded.push(Recorded::ComponentRemoved(entity, kind));
    }

    fn on_entity_removed(&mut self, entity: EntityId) {
        self.recorded.push(Recorded::EntityRemoved(entity));
    }

    fn on_authority_changed(&mut self, entity: EntityId, kind: ComponentKind, has_authority: bool) {
        self.recorded
            .push(Recorded::AuthorityChanged(entity, kind, has_authority));
    }

    fn on_authority_denied(&mut self, entity: EntityId, set: ComponentSetId) {
        self.recorded.push(Recorded::AuthorityDenied(entity, set));
    }

    fn on_writes_discarded(&mut self, entity: EntityId, set: ComponentSetId, count: usize) {
        self.recorded
            .push(Recorded::WritesDiscarded(entity, set, count));
    }

    fn on_rpc_received(
        &mut self,
        entity: EntityId,
        kind: ComponentKind,
        command: CommandId,
        payload: &[u8],
    ) {
        self.recorded
            .push(Recorded::RpcReceived(entity, kind, command, payload.to_vec()));
    }

    fn on_rpc_failed(&mut self, error: &RpcError) {
        self.recorded.push(Recorded::RpcFailed(error.clone()));
    }

    fn on_entity_created(&mut self, entity: EntityId, accepted: bool) {
        self.recorded.push(Recorded::EntityCreated(entity, accepted));
    }
}
