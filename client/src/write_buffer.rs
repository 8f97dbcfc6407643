use std::collections::BTreeMap;

use mosaic_shared::{ComponentData, ComponentKind, ComponentSetId, EntityId, Version};

/// A local write not yet sent to the coordinator
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingWrite {
    Upsert(ComponentData),
    Remove(ComponentKind),
}

impl PendingWrite {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Upsert(component) => component.kind,
            Self::Remove(kind) => *kind,
        }
    }
}

/// Writes buffered per (entity, component set) between flushes. Losing
/// authority over a set drops exactly that set's writes.
#[derive(Default)]
pub struct WriteBuffer {
    pending: BTreeMap<(EntityId, ComponentSetId), Vec<PendingWrite>>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: EntityId, set: ComponentSetId, write: PendingWrite) {
        self.pending.entry((entity, set)).or_default().push(write);
    }

    /// Version of the newest buffered upsert of `kind`
    pub fn latest_version(&self, entity: &EntityId, kind: &ComponentKind) -> Option<Version> {
        self.pending
            .range((*entity, ComponentSetId::new(0))..=(*entity, ComponentSetId::new(u32::MAX)))
            .flat_map(|(_, writes)| writes.iter())
            .filter_map(|write| match write {
                PendingWrite::Upsert(component) if component.kind == *kind => {
                    Some(component.version)
                }
                _ => None,
            })
            .max()
    }

    /// Drops the set's writes, returning how many there were
    pub fn discard(&mut self, entity: &EntityId, set: &ComponentSetId) -> usize {
        self.pending
            .remove(&(*entity, *set))
            .map(|writes| writes.len())
            .unwrap_or(0)
    }

    /// Drops every write to the entity, returning the count per set
    pub fn discard_entity(&mut self, entity: &EntityId) -> Vec<(ComponentSetId, usize)> {
        let sets: Vec<ComponentSetId> = self
            .pending
            .keys()
            .filter(|(pending_entity, _)| pending_entity == entity)
            .map(|(_, set)| *set)
            .collect();
        sets.into_iter()
            .map(|set| (set, self.discard(entity, &set)))
            .collect()
    }

    /// Takes everything buffered, grouped by entity and set, each group in
    /// write order
    pub fn drain(&mut self) -> Vec<(EntityId, PendingWrite)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .flat_map(|((entity, _), writes)| writes.into_iter().map(move |write| (entity, write)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
