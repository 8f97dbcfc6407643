use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use log::debug;

use mosaic_shared::EntityId;

use crate::EntityPoolConfig;

struct ReservedRange {
    next: u64,
    end: u64,
    expires_at: Instant,
}

impl ReservedRange {
    fn len(&self) -> usize {
        (self.end - self.next) as usize
    }
}

/// Entity ids reserved from the coordinator ahead of time, so creating an
/// entity never waits on a round trip for its id.
///
/// Reservations lapse on the coordinator after its ttl. A range is dropped
/// here once the ttl has passed since it was requested, which is never later
/// than the coordinator drops it.
pub struct EntityPool {
    config: EntityPoolConfig,
    ranges: VecDeque<ReservedRange>,
    // when the outstanding request was sent
    requested_at: Option<Instant>,
    ever_requested: bool,
}

impl EntityPool {
    pub fn new(config: EntityPoolConfig) -> Self {
        Self {
            config,
            ranges: VecDeque::new(),
            requested_at: None,
            ever_requested: false,
        }
    }

    /// How many ids to request now, if any. At most one request is
    /// outstanding at a time.
    pub fn refresh_request(&self) -> Option<u32> {
        if self.requested_at.is_some() {
            return None;
        }
        if !self.ever_requested {
            return Some(self.config.initial_reservation).filter(|count| *count > 0);
        }
        if self.available() < self.config.refresh_threshold as usize {
            return Some(self.config.refresh_count).filter(|count| *count > 0);
        }
        None
    }

    pub fn mark_requested(&mut self, now: Instant) {
        self.requested_at = Some(now);
        self.ever_requested = true;
    }

    /// Adds a range reserved for `ttl`. An empty range means the request was
    /// refused.
    pub fn on_reserved(&mut self, now: Instant, first: EntityId, count: u32, ttl: Duration) {
        let requested_at = self.requested_at.take().unwrap_or(now);
        if count == 0 {
            debug!("Entity id reservation refused");
            return;
        }
        let start = first.value();
        self.ranges.push_back(ReservedRange {
            next: start,
            end: start + u64::from(count),
            expires_at: requested_at + ttl,
        });
        debug!("Reserved {} ids from {}", count, first);
    }

    /// Drops ranges whose reservation has lapsed. Returns how many ids went
    /// with them.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.available();
        self.ranges.retain(|range| range.expires_at > now);
        let expired = before - self.available();
        if expired > 0 {
            debug!("{} reserved ids expired", expired);
        }
        expired
    }

    pub fn take(&mut self) -> Option<EntityId> {
        loop {
            let range = self.ranges.front_mut()?;
            if range.next < range.end {
                let entity = EntityId::new(range.next);
                range.next += 1;
                return Some(entity);
            }
            self.ranges.pop_front();
        }
    }

    pub fn available(&self) -> usize {
        self.ranges.iter().map(ReservedRange::len).sum()
    }

    /// Forgets everything, reservations do not survive the connection
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.requested_at = None;
        self.ever_requested = false;
    }
}
