use std::collections::HashMap;

use crate::{ComponentKind, ComponentSetId};

pub mod error;
pub use error::ProtocolError;

/// Per-kind replication settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentSettings {
    /// Whether authority over this kind may be handed to a worker. Kinds that are
    /// not delegable are write-protected and only mutated by the coordinator.
    pub delegable: bool,
    /// Whether updates for this kind must be delivered reliably and in order
    pub reliable: bool,
}

impl ComponentSettings {
    pub fn delegable() -> Self {
        Self {
            delegable: true,
            reliable: true,
        }
    }

    pub fn coordinator_owned() -> Self {
        Self {
            delegable: false,
            reliable: true,
        }
    }

    pub fn unreliable(mut self) -> Self {
        self.reliable = false;
        self
    }
}

// Protocol
#[derive(Clone, Debug, Default)]
pub struct Protocol {
    component_kinds: HashMap<ComponentKind, ComponentSettings>,
    component_sets: HashMap<ComponentSetId, Vec<ComponentKind>>,
    set_of_kind: HashMap<ComponentKind, ComponentSetId>,
    locked: bool,
}

impl Protocol {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn add_component(&mut self, kind: ComponentKind, settings: ComponentSettings) -> &mut Self {
        self.check_lock();
        self.component_kinds.insert(kind, settings);
        self
    }

    /// Registers a component set. Authority over any kind in the set is
    /// authority over all of them.
    ///
    /// # Panics
    ///
    /// Panics if the protocol is locked or the set is invalid. Use
    /// [`Protocol::try_add_component_set`] to handle these cases.
    pub fn add_component_set(&mut self, set: ComponentSetId, kinds: &[ComponentKind]) -> &mut Self {
        if let Err(err) = self.try_add_component_set(set, kinds) {
            panic!("{}", err);
        }
        self
    }

    pub fn try_add_component_set(
        &mut self,
        set: ComponentSetId,
        kinds: &[ComponentKind],
    ) -> Result<&mut Self, ProtocolError> {
        if self.locked {
            return Err(ProtocolError::AlreadyLocked);
        }
        for kind in kinds {
            let Some(settings) = self.component_kinds.get(kind) else {
                return Err(ProtocolError::KindNotRegistered { kind: *kind, set });
            };
            if !settings.delegable {
                return Err(ProtocolError::KindNotDelegable { kind: *kind, set });
            }
            if let Some(existing) = self.set_of_kind.get(kind) {
                if *existing != set {
                    return Err(ProtocolError::KindAlreadyInSet {
                        kind: *kind,
                        existing: *existing,
                        set,
                    });
                }
            }
        }
        let entry = self.component_sets.entry(set).or_default();
        for kind in kinds {
            if !entry.contains(kind) {
                entry.push(*kind);
            }
            self.set_of_kind.insert(*kind, set);
        }
        entry.sort();
        Ok(self)
    }

    pub fn lock(&mut self) {
        self.check_lock();
        self.locked = true;
    }

    pub fn check_lock(&self) {
        if self.locked {
            panic!("Protocol already locked!");
        }
    }

    /// Takes the finished protocol out of the builder, locked against
    /// further changes
    pub fn build(&mut self) -> Self {
        if !self.locked {
            self.lock();
        }
        std::mem::take(self)
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn settings(&self, kind: &ComponentKind) -> Option<&ComponentSettings> {
        self.component_kinds.get(kind)
    }

    pub fn is_registered(&self, kind: &ComponentKind) -> bool {
        self.component_kinds.contains_key(kind)
    }

    pub fn is_delegable(&self, kind: &ComponentKind) -> bool {
        self.component_kinds
            .get(kind)
            .map(|settings| settings.delegable)
            .unwrap_or(false)
    }

    pub fn is_reliable(&self, kind: &ComponentKind) -> bool {
        self.component_kinds
            .get(kind)
            .map(|settings| settings.reliable)
            .unwrap_or(true)
    }

    /// The set whose authority governs writes to `kind`
    pub fn set_of(&self, kind: &ComponentKind) -> Option<ComponentSetId> {
        self.set_of_kind.get(kind).copied()
    }

    pub fn kinds_in_set(&self, set: &ComponentSetId) -> &[ComponentKind] {
        self.component_sets
            .get(set)
            .map(|kinds| kinds.as_slice())
            .unwrap_or(&[])
    }

    pub fn component_sets(&self) -> impl Iterator<Item = &ComponentSetId> {
        self.component_sets.keys()
    }
}
