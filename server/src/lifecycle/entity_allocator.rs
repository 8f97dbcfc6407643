use mosaic_shared::{EntityId, WorkerId};

use super::LifecycleError;

/// Largest range a single reservation request may take
pub const MAX_RESERVATION: u32 = 4096;

/// Hands out entity ids in increasing order. Ids are never reused, even after
/// the entity they named was retired.
pub struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    pub fn new() -> Self {
        // zero is never a valid entity id
        Self { next: 1 }
    }

    /// Id for an entity spawned by the coordinator itself
    pub fn allocate(&mut self) -> Result<EntityId, LifecycleError> {
        let entity = EntityId::new(self.next);
        self.next = self
            .next
            .checked_add(1)
            .ok_or(LifecycleError::IdSpaceExhausted { requested: 1 })?;
        Ok(entity)
    }

    /// Contiguous range of `count` ids, returned as its first id
    pub fn reserve(&mut self, worker: WorkerId, count: u32) -> Result<EntityId, LifecycleError> {
        if count == 0 || count > MAX_RESERVATION {
            return Err(LifecycleError::InvalidReservation { worker, count });
        }
        let first = self.next;
        self.next = first
            .checked_add(u64::from(count))
            .ok_or(LifecycleError::IdSpaceExhausted { requested: count })?;
        Ok(EntityId::new(first))
    }

    /// Next id that would be handed out
    pub fn peek(&self) -> EntityId {
        EntityId::new(self.next)
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}
