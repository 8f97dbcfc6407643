use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};

use super::{StoreDelta, StoreError};
use crate::{ComponentData, ComponentKind, EntityId, Version};

/// Result of a single `upsert`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    Stale { stored: Version },
    Tombstoned,
    MissingEntity,
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn into_result(
        self,
        entity: EntityId,
        kind: ComponentKind,
        attempted: Version,
    ) -> Result<(), StoreError> {
        match self {
            Self::Applied => Ok(()),
            Self::Stale { stored } => Err(StoreError::StaleWrite {
                entity,
                kind,
                stored,
                attempted,
            }),
            Self::Tombstoned => Err(StoreError::EntityTombstoned { entity }),
            Self::MissingEntity => Err(StoreError::EntityNotFound { entity }),
        }
    }
}

enum EntityRecord {
    Live(BTreeMap<ComponentKind, ComponentData>),
    Tombstoned,
    // slot of an entity that left this view, may be revived by a later insert
    Vacant,
}

#[derive(Default)]
struct Arena {
    index: HashMap<EntityId, usize>,
    slots: Vec<Arc<Mutex<EntityRecord>>>,
}

/// Per-entity map of component kind to versioned state.
///
/// Records live in an arena indexed by [`EntityId`]. Each record has its own
/// lock, so writes to unrelated entities never contend; the arena itself is
/// only write-locked when a new entity is allocated a slot.
pub struct ComponentStore {
    arena: RwLock<Arena>,
    subscribers: RwLock<Vec<Sender<StoreDelta>>>,
}

impl Default for ComponentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentStore {
    pub fn new() -> Self {
        Self {
            arena: RwLock::new(Arena::default()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Returns a channel that receives every delta emitted after this call
    pub fn subscribe(&self) -> Receiver<StoreDelta> {
        let (sender, receiver) = unbounded();
        self.subscribers.write().push(sender);
        receiver
    }

    fn emit(&self, delta: StoreDelta) {
        // a failed send means the receiver was dropped
        self.subscribers
            .write()
            .retain(|subscriber| subscriber.send(delta.clone()).is_ok());
    }

    fn record(&self, entity: &EntityId) -> Option<Arc<Mutex<EntityRecord>>> {
        let arena = self.arena.read();
        let slot = *arena.index.get(entity)?;
        arena.slots.get(slot).cloned()
    }

    fn record_or_allocate(&self, entity: &EntityId) -> Arc<Mutex<EntityRecord>> {
        if let Some(record) = self.record(entity) {
            return record;
        }
        let mut arena = self.arena.write();
        // another writer may have allocated between the two locks
        if let Some(slot) = arena.index.get(entity) {
            return arena.slots[*slot].clone();
        }
        let slot = arena.slots.len();
        let record = Arc::new(Mutex::new(EntityRecord::Vacant));
        arena.slots.push(record.clone());
        arena.index.insert(*entity, slot);
        record
    }

    /// Creates an entity with its full initial component set. Observers receive
    /// a single `EntityAdded` delta, never a partially populated entity.
    pub fn insert_entity(
        &self,
        entity: EntityId,
        components: Vec<ComponentData>,
    ) -> Result<(), StoreError> {
        let record = self.record_or_allocate(&entity);
        let mut record = record.lock();
        match &*record {
            EntityRecord::Live(_) => return Err(StoreError::EntityAlreadyExists { entity }),
            EntityRecord::Tombstoned => return Err(StoreError::EntityTombstoned { entity }),
            EntityRecord::Vacant => {}
        }
        let mut map = BTreeMap::new();
        for component in components {
            map.insert(component.kind, component);
        }
        let components = map.values().cloned().collect();
        *record = EntityRecord::Live(map);
        self.emit(StoreDelta::EntityAdded { entity, components });
        Ok(())
    }

    /// Replaces the stored state only if `version` is newer than the stored
    /// version. Last-writer-wins is per component, so different components of
    /// one entity may be written concurrently by different workers.
    pub fn upsert(
        &self,
        entity: EntityId,
        kind: ComponentKind,
        state: Vec<u8>,
        version: Version,
    ) -> WriteOutcome {
        let Some(record) = self.record(&entity) else {
            debug!("Dropping write to unknown entity {}/{}", entity, kind);
            return WriteOutcome::MissingEntity;
        };
        let mut record = record.lock();
        let components = match &mut *record {
            EntityRecord::Live(components) => components,
            EntityRecord::Tombstoned => {
                info!("Dropping write to tombstoned entity {}/{} (v{})", entity, kind, version);
                return WriteOutcome::Tombstoned;
            }
            EntityRecord::Vacant => {
                debug!("Dropping write to evicted entity {}/{}", entity, kind);
                return WriteOutcome::MissingEntity;
            }
        };

        let component = ComponentData::new(kind, version, state);
        match components.get_mut(&kind) {
            Some(existing) => {
                if version <= existing.version {
                    debug!(
                        "Stale write to {}/{}: v{} <= stored v{}",
                        entity, kind, version, existing.version
                    );
                    return WriteOutcome::Stale {
                        stored: existing.version,
                    };
                }
                *existing = component.clone();
                self.emit(StoreDelta::ComponentUpdated { entity, component });
            }
            None => {
                components.insert(kind, component.clone());
                self.emit(StoreDelta::ComponentAdded { entity, component });
            }
        }
        WriteOutcome::Applied
    }

    /// Replaces the stored component whatever its version. Used to put back
    /// the coordinator's state after a local write it rejected.
    pub fn overwrite(&self, entity: EntityId, component: ComponentData) -> WriteOutcome {
        let Some(record) = self.record(&entity) else {
            return WriteOutcome::MissingEntity;
        };
        let mut record = record.lock();
        let components = match &mut *record {
            EntityRecord::Live(components) => components,
            EntityRecord::Tombstoned => return WriteOutcome::Tombstoned,
            EntityRecord::Vacant => return WriteOutcome::MissingEntity,
        };
        let delta = if components.contains_key(&component.kind) {
            StoreDelta::ComponentUpdated {
                entity,
                component: component.clone(),
            }
        } else {
            StoreDelta::ComponentAdded {
                entity,
                component: component.clone(),
            }
        };
        components.insert(component.kind, component);
        self.emit(delta);
        WriteOutcome::Applied
    }

    pub fn remove_component(&self, entity: EntityId, kind: ComponentKind) -> bool {
        let Some(record) = self.record(&entity) else {
            return false;
        };
        let mut record = record.lock();
        let EntityRecord::Live(components) = &mut *record else {
            return false;
        };
        if components.remove(&kind).is_none() {
            return false;
        }
        self.emit(StoreDelta::ComponentRemoved { entity, kind });
        true
    }

    /// Tombstones the entity and releases all of its component state. Any later
    /// write or insert for this id is dropped.
    pub fn remove(&self, entity: EntityId) -> bool {
        let record = self.record_or_allocate(&entity);
        let mut record = record.lock();
        let was_live = matches!(&*record, EntityRecord::Live(_));
        if matches!(&*record, EntityRecord::Tombstoned) {
            return false;
        }
        *record = EntityRecord::Tombstoned;
        if was_live {
            self.emit(StoreDelta::EntityRemoved {
                entity,
                tombstoned: true,
            });
        }
        true
    }

    /// Drops the entity from this view without tombstoning it, it can be
    /// inserted again later
    pub fn evict(&self, entity: EntityId) -> bool {
        let Some(record) = self.record(&entity) else {
            return false;
        };
        let mut record = record.lock();
        if !matches!(&*record, EntityRecord::Live(_)) {
            return false;
        }
        *record = EntityRecord::Vacant;
        self.emit(StoreDelta::EntityRemoved {
            entity,
            tombstoned: false,
        });
        true
    }

    pub fn get(&self, entity: &EntityId, kind: &ComponentKind) -> Option<ComponentData> {
        let record = self.record(entity)?;
        let record = record.lock();
        match &*record {
            EntityRecord::Live(components) => components.get(kind).cloned(),
            _ => None,
        }
    }

    /// All components of a live entity, ordered by kind
    pub fn entity_snapshot(&self, entity: &EntityId) -> Option<Vec<ComponentData>> {
        let record = self.record(entity)?;
        let record = record.lock();
        match &*record {
            EntityRecord::Live(components) => Some(components.values().cloned().collect()),
            _ => None,
        }
    }

    pub fn component_kinds(&self, entity: &EntityId) -> Vec<ComponentKind> {
        let Some(record) = self.record(entity) else {
            return Vec::new();
        };
        let record = record.lock();
        match &*record {
            EntityRecord::Live(components) => components.keys().copied().collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains(&self, entity: &EntityId) -> bool {
        self.record(entity)
            .map(|record| matches!(&*record.lock(), EntityRecord::Live(_)))
            .unwrap_or(false)
    }

    pub fn is_tombstoned(&self, entity: &EntityId) -> bool {
        self.record(entity)
            .map(|record| matches!(&*record.lock(), EntityRecord::Tombstoned))
            .unwrap_or(false)
    }

    /// Live entities, sorted
    pub fn entities(&self) -> Vec<EntityId> {
        let slots: Vec<(EntityId, Arc<Mutex<EntityRecord>>)> = {
            let arena = self.arena.read();
            arena
                .index
                .iter()
                .map(|(entity, slot)| (*entity, arena.slots[*slot].clone()))
                .collect()
        };
        let mut entities: Vec<EntityId> = slots
            .into_iter()
            .filter(|(_, record)| matches!(&*record.lock(), EntityRecord::Live(_)))
            .map(|(entity, _)| entity)
            .collect();
        entities.sort();
        entities
    }

    pub fn len(&self) -> usize {
        self.entities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
