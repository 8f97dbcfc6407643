use std::collections::HashMap;

use log::trace;

use super::ViewEvent;
use crate::{
    messages::rpc::RpcError, CommandId, ComponentData, ComponentKind, ComponentSetId, EntityId,
};

/// Attachment points for engine-specific code. Every method defaults to doing
/// nothing, implement only the ones you need.
pub trait ViewCallbacks {
    fn on_entity_added(&mut self, _entity: EntityId, _components: &[ComponentData]) {}

    fn on_component_added(&mut self, _entity: EntityId, _component: &ComponentData) {}

    fn on_component_updated(&mut self, _entity: EntityId, _kind: ComponentKind, _state: &[u8]) {}

    fn on_component_removed(&mut self, _entity: EntityId, _kind: ComponentKind) {}

    fn on_entity_removed(&mut self, _entity: EntityId) {}

    fn on_authority_changed(&mut self, _entity: EntityId, _kind: ComponentKind, _has_authority: bool) {
    }

    fn on_authority_denied(&mut self, _entity: EntityId, _set: ComponentSetId) {}

    /// Called after authority loss dropped writes that were never sent
    fn on_writes_discarded(&mut self, _entity: EntityId, _set: ComponentSetId, _count: usize) {}

    fn on_rpc_received(
        &mut self,
        _entity: EntityId,
        _kind: ComponentKind,
        _command: CommandId,
        _payload: &[u8],
    ) {
    }

    fn on_rpc_failed(&mut self, _error: &RpcError) {}

    fn on_entity_created(&mut self, _entity: EntityId, _accepted: bool) {}
}

/// Identifies a callback registered on a [`Dispatcher`], used to remove it
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u32);

impl CallbackId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

pub type ComponentCallback = Box<dyn FnMut(EntityId, &ComponentData) + Send>;
pub type EntityCallback = Box<dyn FnMut(EntityId) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Slot {
    ComponentAdded,
    ComponentUpdated,
    ComponentRemoved,
    AuthorityGained,
    AuthorityLost,
}

/// Routes view events to callbacks.
///
/// Every event goes to the [`ViewCallbacks`] passed to [`Dispatcher::dispatch`]
/// first, then to the callbacks registered for its component kind, in
/// registration order. A component added as part of a new entity counts as
/// added. Removal of a whole entity is only reported through
/// `on_entity_removed`.
#[derive(Default)]
pub struct Dispatcher {
    next_id: u32,
    component_callbacks: HashMap<(Slot, ComponentKind), Vec<(CallbackId, ComponentCallback)>>,
    entity_callbacks: HashMap<(Slot, ComponentKind), Vec<(CallbackId, EntityCallback)>>,
    registered: HashMap<CallbackId, (Slot, ComponentKind)>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_component_added(
        &mut self,
        kind: ComponentKind,
        callback: impl FnMut(EntityId, &ComponentData) + Send + 'static,
    ) -> CallbackId {
        self.register_component(Slot::ComponentAdded, kind, Box::new(callback))
    }

    pub fn register_component_updated(
        &mut self,
        kind: ComponentKind,
        callback: impl FnMut(EntityId, &ComponentData) + Send + 'static,
    ) -> CallbackId {
        self.register_component(Slot::ComponentUpdated, kind, Box::new(callback))
    }

    pub fn register_component_removed(
        &mut self,
        kind: ComponentKind,
        callback: impl FnMut(EntityId) + Send + 'static,
    ) -> CallbackId {
        self.register_entity(Slot::ComponentRemoved, kind, Box::new(callback))
    }

    pub fn register_authority_gained(
        &mut self,
        kind: ComponentKind,
        callback: impl FnMut(EntityId) + Send + 'static,
    ) -> CallbackId {
        self.register_entity(Slot::AuthorityGained, kind, Box::new(callback))
    }

    pub fn register_authority_lost(
        &mut self,
        kind: ComponentKind,
        callback: impl FnMut(EntityId) + Send + 'static,
    ) -> CallbackId {
        self.register_entity(Slot::AuthorityLost, kind, Box::new(callback))
    }

    /// Returns false if `id` was not registered
    pub fn remove_callback(&mut self, id: CallbackId) -> bool {
        let Some(key) = self.registered.remove(&id) else {
            return false;
        };
        if let Some(callbacks) = self.component_callbacks.get_mut(&key) {
            callbacks.retain(|(registered, _)| *registered != id);
        }
        if let Some(callbacks) = self.entity_callbacks.get_mut(&key) {
            callbacks.retain(|(registered, _)| *registered != id);
        }
        true
    }

    pub fn callback_count(&self) -> usize {
        self.registered.len()
    }

    fn next_id(&mut self, slot: Slot, kind: ComponentKind) -> CallbackId {
        self.next_id += 1;
        let id = CallbackId(self.next_id);
        self.registered.insert(id, (slot, kind));
        id
    }

    fn register_component(
        &mut self,
        slot: Slot,
        kind: ComponentKind,
        callback: ComponentCallback,
    ) -> CallbackId {
        let id = self.next_id(slot, kind);
        self.component_callbacks
            .entry((slot, kind))
            .or_default()
            .push((id, callback));
        trace!("Registered {:?} callback {} for {}", slot, id.raw(), kind);
        id
    }

    fn register_entity(
        &mut self,
        slot: Slot,
        kind: ComponentKind,
        callback: EntityCallback,
    ) -> CallbackId {
        let id = self.next_id(slot, kind);
        self.entity_callbacks
            .entry((slot, kind))
            .or_default()
            .push((id, callback));
        trace!("Registered {:?} callback {} for {}", slot, id.raw(), kind);
        id
    }

    fn run_component(&mut self, slot: Slot, entity: EntityId, component: &ComponentData) {
        if let Some(callbacks) = self.component_callbacks.get_mut(&(slot, component.kind)) {
            for (_, callback) in callbacks.iter_mut() {
                callback(entity, component);
            }
        }
    }

    fn run_entity(&mut self, slot: Slot, entity: EntityId, kind: ComponentKind) {
        if let Some(callbacks) = self.entity_callbacks.get_mut(&(slot, kind)) {
            for (_, callback) in callbacks.iter_mut() {
                callback(entity);
            }
        }
    }

    pub fn dispatch(&mut self, events: &[ViewEvent], callbacks: &mut dyn ViewCallbacks) {
        for event in events {
            match event {
                ViewEvent::EntityAdded { entity, components } => {
                    callbacks.on_entity_added(*entity, components);
                    for component in components {
                        self.run_component(Slot::ComponentAdded, *entity, component);
                    }
                }
                ViewEvent::ComponentAdded { entity, component } => {
                    callbacks.on_component_added(*entity, component);
                    self.run_component(Slot::ComponentAdded, *entity, component);
                }
                ViewEvent::ComponentUpdated { entity, component } => {
                    callbacks.on_component_updated(*entity, component.kind, &component.state);
                    self.run_component(Slot::ComponentUpdated, *entity, component);
                }
                ViewEvent::ComponentRemoved { entity, kind } => {
                    callbacks.on_component_removed(*entity, *kind);
                    self.run_entity(Slot::ComponentRemoved, *entity, *kind);
                }
                ViewEvent::EntityRemoved { entity, .. } => callbacks.on_entity_removed(*entity),
                ViewEvent::AuthorityChanged {
                    entity,
                    kind,
                    has_authority,
                } => {
                    callbacks.on_authority_changed(*entity, *kind, *has_authority);
                    let slot = if *has_authority {
                        Slot::AuthorityGained
                    } else {
                        Slot::AuthorityLost
                    };
                    self.run_entity(slot, *entity, *kind);
                }
                ViewEvent::AuthorityDenied { entity, set } => {
                    callbacks.on_authority_denied(*entity, *set)
                }
                ViewEvent::WritesDiscarded { entity, set, count } => {
                    callbacks.on_writes_discarded(*entity, *set, *count)
                }
                ViewEvent::RpcReceived {
                    entity,
                    kind,
                    command,
                    payload,
                    ..
                } => callbacks.on_rpc_received(*entity, *kind, *command, payload),
                ViewEvent::RpcFailed(error) => callbacks.on_rpc_failed(error),
                ViewEvent::EntityCreated { entity, accepted } => {
                    callbacks.on_entity_created(*entity, *accepted)
                }
            }
        }
    }
}
