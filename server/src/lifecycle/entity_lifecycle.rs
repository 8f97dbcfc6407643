use std::{
    collections::{BTreeMap, HashMap, HashSet},
    time::{Duration, Instant},
};

use log::{debug, info};

use mosaic_shared::{EntityId, WorkerId};

use super::{EntityAllocator, LifecycleError};

struct Reservation {
    first: u64,
    // exclusive
    end: u64,
    expires_at: Instant,
    claimed: HashSet<u64>,
}

impl Reservation {
    fn contains(&self, entity: &EntityId) -> bool {
        (self.first..self.end).contains(&entity.value())
    }

    fn is_exhausted(&self) -> bool {
        self.claimed.len() as u64 >= self.end - self.first
    }
}

/// Creation and deletion bookkeeping on the coordinator.
///
/// Workers create entities from ids they reserved in advance, so a create
/// never waits on the allocator. Deleted entities drain for the RPC retry
/// window before they are retired, which keeps late RPCs and releases aimed
/// at them from resurrecting anything.
pub struct EntityLifecycle {
    allocator: EntityAllocator,
    reservation_ttl: Duration,
    drain_duration: Duration,
    reservations: HashMap<WorkerId, Vec<Reservation>>,
    draining: BTreeMap<EntityId, Instant>,
    retired: usize,
}

impl EntityLifecycle {
    pub fn new(reservation_ttl: Duration, drain_duration: Duration) -> Self {
        Self {
            allocator: EntityAllocator::new(),
            reservation_ttl,
            drain_duration,
            reservations: HashMap::new(),
            draining: BTreeMap::new(),
            retired: 0,
        }
    }

    /// Reserves `count` ids for `worker`, valid until the reservation ttl passes
    pub fn reserve(
        &mut self,
        now: Instant,
        worker: WorkerId,
        count: u32,
    ) -> Result<EntityId, LifecycleError> {
        let first = self.allocator.reserve(worker, count)?;
        self.reservations.entry(worker).or_default().push(Reservation {
            first: first.value(),
            end: first.value() + u64::from(count),
            expires_at: now + self.reservation_ttl,
            claimed: HashSet::new(),
        });
        debug!("Reserved {} ids from {} for {}", count, first, worker);
        Ok(first)
    }

    /// Id for an entity the coordinator spawns on its own behalf
    pub fn allocate(&mut self) -> Result<EntityId, LifecycleError> {
        self.allocator.allocate()
    }

    /// Consumes a reserved id for a create request from `worker`
    pub fn claim(
        &mut self,
        now: Instant,
        worker: WorkerId,
        entity: EntityId,
    ) -> Result<(), LifecycleError> {
        if self.draining.contains_key(&entity) {
            return Err(LifecycleError::EntityDraining { entity });
        }
        let reservation = self
            .reservations
            .get_mut(&worker)
            .and_then(|reservations| {
                reservations
                    .iter_mut()
                    .find(|reservation| reservation.contains(&entity))
            })
            .ok_or(LifecycleError::NotReserved { entity, worker })?;
        if reservation.expires_at <= now {
            return Err(LifecycleError::ReservationExpired { entity, worker });
        }
        if !reservation.claimed.insert(entity.value()) {
            return Err(LifecycleError::AlreadyClaimed { entity });
        }
        if let Some(reservations) = self.reservations.get_mut(&worker) {
            reservations.retain(|reservation| !reservation.is_exhausted());
        }
        Ok(())
    }

    /// Drops reservations past their ttl. Returns how many lapsed.
    pub fn expire_reservations(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        for (worker, reservations) in self.reservations.iter_mut() {
            let before = reservations.len();
            reservations.retain(|reservation| reservation.expires_at > now);
            let lapsed = before - reservations.len();
            if lapsed > 0 {
                debug!("{} reservations of {} expired", lapsed, worker);
            }
            expired += lapsed;
        }
        self.reservations
            .retain(|_, reservations| !reservations.is_empty());
        expired
    }

    /// Releases everything reserved by a worker that went away
    pub fn drop_worker(&mut self, worker: &WorkerId) {
        self.reservations.remove(worker);
    }

    /// Ids `worker` could still claim, for diagnostics
    pub fn reserved_remaining(&self, worker: &WorkerId) -> u64 {
        self.reservations
            .get(worker)
            .map(|reservations| {
                reservations
                    .iter()
                    .map(|reservation| {
                        reservation.end - reservation.first - reservation.claimed.len() as u64
                    })
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn begin_drain(&mut self, now: Instant, entity: EntityId) {
        self.draining.insert(entity, now + self.drain_duration);
    }

    pub fn is_draining(&self, entity: &EntityId) -> bool {
        self.draining.contains_key(entity)
    }

    /// Retires entities whose drain window elapsed
    pub fn retire_expired(&mut self, now: Instant) -> Vec<EntityId> {
        let retired: Vec<EntityId> = self
            .draining
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(entity, _)| *entity)
            .collect();
        for entity in &retired {
            self.draining.remove(entity);
            info!("Retired {}", entity);
        }
        self.retired += retired.len();
        retired
    }

    pub fn retired_count(&self) -> usize {
        self.retired
    }
}
