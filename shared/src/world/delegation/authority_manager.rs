use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use super::{AuthorityError, AuthorityState, AuthorityTransition};
use crate::{AuthoritySequence, ComponentKind, ComponentSetId, EntityId, Protocol, WorkerId};

struct EntityAuthority {
    // shared by every set of the entity, so transitions are totally ordered per entity
    last_sequence: AuthoritySequence,
    sets: BTreeMap<ComponentSetId, AuthorityState>,
    tombstoned: bool,
}

impl EntityAuthority {
    fn new(protocol: &Protocol) -> Self {
        let sets = protocol
            .component_sets()
            .map(|set| (*set, AuthorityState::Unowned))
            .collect();
        Self {
            last_sequence: 0,
            sets,
            tombstoned: false,
        }
    }

    fn state_mut(
        &mut self,
        entity: EntityId,
        set: ComponentSetId,
    ) -> Result<&mut AuthorityState, AuthorityError> {
        if self.tombstoned {
            return Err(AuthorityError::EntityTombstoned { entity });
        }
        self.sets
            .get_mut(&set)
            .ok_or(AuthorityError::UnknownSet { set })
    }

    fn check_sequence(
        &self,
        entity: EntityId,
        sequence: AuthoritySequence,
    ) -> Result<(), AuthorityError> {
        if sequence <= self.last_sequence {
            return Err(AuthorityError::StaleSequence {
                entity,
                last_applied: self.last_sequence,
                attempted: sequence,
            });
        }
        Ok(())
    }
}

/// Tracks, per entity and component set, which worker may write.
///
/// Each entity's record sits behind its own lock so transitions for one entity
/// are serialized while unrelated entities proceed in parallel. The
/// coordinator drives transitions with the `assign_*` methods, which pick the
/// next sequence under that lock; workers mirror them with `apply_*`, which
/// reject any sequence not newer than the last one applied.
pub struct AuthorityManager {
    protocol: Arc<Protocol>,
    records: RwLock<HashMap<EntityId, Arc<Mutex<EntityAuthority>>>>,
    reassignments: Mutex<Vec<(EntityId, ComponentSetId)>>,
}

impl AuthorityManager {
    pub fn new(protocol: Arc<Protocol>) -> Self {
        Self {
            protocol,
            records: RwLock::new(HashMap::new()),
            reassignments: Mutex::new(Vec::new()),
        }
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    fn record(
        &self,
        entity: &EntityId,
        operation: &'static str,
    ) -> Result<Arc<Mutex<EntityAuthority>>, AuthorityError> {
        self.records
            .read()
            .get(entity)
            .cloned()
            .ok_or(AuthorityError::EntityNotRegistered {
                entity: *entity,
                operation,
            })
    }

    /// Register an entity with every protocol set `Unowned`
    ///
    /// # Panics
    ///
    /// Panics if the entity is already registered.
    /// Consider using `try_register_entity` for non-panicking error handling.
    pub fn register_entity(&self, entity: EntityId) {
        if let Err(err) = self.try_register_entity(entity) {
            panic!("{}", err);
        }
    }

    pub fn try_register_entity(&self, entity: EntityId) -> Result<(), AuthorityError> {
        let mut records = self.records.write();
        if records.contains_key(&entity) {
            return Err(AuthorityError::EntityAlreadyRegistered { entity });
        }
        records.insert(
            entity,
            Arc::new(Mutex::new(EntityAuthority::new(&self.protocol))),
        );
        Ok(())
    }

    /// Registers the entity unless it already is. Returns true if it was new.
    pub fn ensure_registered(&self, entity: EntityId) -> bool {
        self.try_register_entity(entity).is_ok()
    }

    pub fn deregister_entity(&self, entity: &EntityId) -> bool {
        self.records.write().remove(entity).is_some()
    }

    pub fn is_registered(&self, entity: &EntityId) -> bool {
        self.records.read().contains_key(entity)
    }

    pub fn state(&self, entity: &EntityId, set: &ComponentSetId) -> Option<AuthorityState> {
        let record = self.record(entity, "state").ok()?;
        let record = record.lock();
        record.sets.get(set).copied()
    }

    pub fn last_sequence(&self, entity: &EntityId) -> Option<AuthoritySequence> {
        let record = self.record(entity, "last_sequence").ok()?;
        let sequence = record.lock().last_sequence;
        Some(sequence)
    }

    /// The worker currently allowed to write `kind` on `entity`
    pub fn writer_of(&self, entity: &EntityId, kind: &ComponentKind) -> Option<WorkerId> {
        let set = self.protocol.set_of(kind)?;
        self.state(entity, &set)?.writer()
    }

    /// Asks for authority. Only an `Unowned` record moves to `PendingGrant`;
    /// the grant itself happens later through [`AuthorityManager::assign_grant`].
    pub fn request_grant(
        &self,
        entity: EntityId,
        set: ComponentSetId,
        requester: WorkerId,
        has_interest: bool,
    ) -> Result<(), AuthorityError> {
        let record = self.record(&entity, "request_grant")?;
        let mut record = record.lock();
        let state = record.state_mut(entity, set)?;
        if !has_interest {
            return Err(AuthorityError::NoInterest {
                entity,
                set,
                worker: requester,
            });
        }
        match *state {
            AuthorityState::Unowned => {
                *state = AuthorityState::PendingGrant { requester };
                debug!("{} requested authority over {}/{}", requester, entity, set);
                Ok(())
            }
            AuthorityState::PendingGrant { requester: holder }
            | AuthorityState::Owned { owner: holder }
            | AuthorityState::PendingRelease { owner: holder } => {
                if holder == requester {
                    Err(AuthorityError::InvalidTransition {
                        entity,
                        set,
                        operation: "request",
                    })
                } else {
                    Err(AuthorityError::Contended {
                        entity,
                        set,
                        holder,
                    })
                }
            }
        }
    }

    /// Coordinator side: completes a pending grant, assigning the next
    /// sequence. If the requester has lost interest the record stays pending.
    pub fn assign_grant(
        &self,
        entity: EntityId,
        set: ComponentSetId,
        has_interest: &dyn Fn(WorkerId) -> bool,
    ) -> Result<AuthorityTransition, AuthorityError> {
        let record = self.record(&entity, "assign_grant")?;
        let mut record = record.lock();
        let sequence = record.last_sequence + 1;
        let state = record.state_mut(entity, set)?;
        let AuthorityState::PendingGrant { requester } = *state else {
            return Err(AuthorityError::InvalidTransition {
                entity,
                set,
                operation: "grant",
            });
        };
        if !has_interest(requester) {
            return Err(AuthorityError::NoInterest {
                entity,
                set,
                worker: requester,
            });
        }
        *state = AuthorityState::Owned { owner: requester };
        record.last_sequence = sequence;
        info!("Granted {}/{} to {} (seq {})", entity, set, requester, sequence);
        Ok(AuthorityTransition {
            worker: requester,
            authoritative: true,
            sequence,
        })
    }

    /// Applies a grant decided elsewhere. Rejected, with the previous state
    /// retained, unless `sequence` is newer than the last applied transition
    /// and the owner has interest. Returns the previous writer.
    pub fn apply_grant(
        &self,
        entity: EntityId,
        set: ComponentSetId,
        owner: WorkerId,
        sequence: AuthoritySequence,
        has_interest: bool,
    ) -> Result<Option<WorkerId>, AuthorityError> {
        let record = self.record(&entity, "apply_grant")?;
        let mut record = record.lock();
        record.check_sequence(entity, sequence)?;
        let state = record.state_mut(entity, set)?;
        if !has_interest {
            return Err(AuthorityError::NoInterest {
                entity,
                set,
                worker: owner,
            });
        }
        let previous = state.writer();
        *state = AuthorityState::Owned { owner };
        record.last_sequence = sequence;
        Ok(previous)
    }

    /// The owner announces it is giving authority up
    pub fn begin_release(
        &self,
        entity: EntityId,
        set: ComponentSetId,
        owner: WorkerId,
    ) -> Result<(), AuthorityError> {
        let record = self.record(&entity, "begin_release")?;
        let mut record = record.lock();
        let state = record.state_mut(entity, set)?;
        match *state {
            AuthorityState::Owned { owner: current } if current == owner => {
                *state = AuthorityState::PendingRelease { owner };
                Ok(())
            }
            AuthorityState::PendingGrant { requester } if requester == owner => {
                // nothing was granted yet, just withdraw the request
                *state = AuthorityState::Unowned;
                Ok(())
            }
            _ => Err(AuthorityError::InvalidTransition {
                entity,
                set,
                operation: "release",
            }),
        }
    }

    /// Coordinator side: completes a release, assigning the next sequence
    pub fn assign_release(
        &self,
        entity: EntityId,
        set: ComponentSetId,
    ) -> Result<AuthorityTransition, AuthorityError> {
        let record = self.record(&entity, "assign_release")?;
        let mut record = record.lock();
        let sequence = record.last_sequence + 1;
        let state = record.state_mut(entity, set)?;
        let Some(owner) = state.writer() else {
            return Err(AuthorityError::InvalidTransition {
                entity,
                set,
                operation: "release",
            });
        };
        *state = AuthorityState::Unowned;
        record.last_sequence = sequence;
        info!("Released {}/{} from {} (seq {})", entity, set, owner, sequence);
        Ok(AuthorityTransition {
            worker: owner,
            authoritative: false,
            sequence,
        })
    }

    /// Applies a release decided elsewhere. Returns the previous writer.
    pub fn apply_release(
        &self,
        entity: EntityId,
        set: ComponentSetId,
        sequence: AuthoritySequence,
    ) -> Result<Option<WorkerId>, AuthorityError> {
        let record = self.record(&entity, "apply_release")?;
        let mut record = record.lock();
        record.check_sequence(entity, sequence)?;
        let state = record.state_mut(entity, set)?;
        let previous = state.writer();
        *state = AuthorityState::Unowned;
        record.last_sequence = sequence;
        Ok(previous)
    }

    /// Rejects a write unless `worker` holds authority over the set
    /// containing `kind`
    pub fn check_write(
        &self,
        entity: EntityId,
        kind: ComponentKind,
        worker: WorkerId,
    ) -> Result<(), AuthorityError> {
        if !self.protocol.is_delegable(&kind) {
            return Err(AuthorityError::CoordinatorOwned { entity, kind });
        }
        let not_authoritative = AuthorityError::NotAuthoritative {
            entity,
            kind,
            worker,
        };
        let Some(set) = self.protocol.set_of(&kind) else {
            return Err(not_authoritative);
        };
        let record = self.record(&entity, "check_write")?;
        let mut record = record.lock();
        let state = record.state_mut(entity, set)?;
        if state.writer() == Some(worker) {
            Ok(())
        } else {
            Err(not_authoritative)
        }
    }

    /// Returns every record tied to `worker` to `Unowned` and queues the owned
    /// ones for reassignment. Entities are left untouched.
    pub fn revoke_worker(&self, worker: WorkerId) -> Vec<(EntityId, ComponentSetId)> {
        let records: Vec<(EntityId, Arc<Mutex<EntityAuthority>>)> = self
            .records
            .read()
            .iter()
            .map(|(entity, record)| (*entity, record.clone()))
            .collect();

        let mut revoked = Vec::new();
        for (entity, record) in records {
            let mut record = record.lock();
            for (set, state) in record.sets.iter_mut() {
                if state.holder() != Some(worker) {
                    continue;
                }
                *state = AuthorityState::Unowned;
                revoked.push((entity, *set));
            }
        }
        revoked.sort();
        if !revoked.is_empty() {
            warn!(
                "{} disconnected, {} authority records marked for reassignment",
                worker,
                revoked.len()
            );
        }
        self.reassignments.lock().extend(revoked.iter().copied());
        revoked
    }

    pub fn take_reassignments(&self) -> Vec<(EntityId, ComponentSetId)> {
        std::mem::take(&mut *self.reassignments.lock())
    }

    /// Marks the entity deleted. Returns the workers that held or were being
    /// granted authority, per set.
    pub fn tombstone(&self, entity: EntityId) -> Vec<(ComponentSetId, WorkerId)> {
        let Ok(record) = self.record(&entity, "tombstone") else {
            return Vec::new();
        };
        let mut record = record.lock();
        record.tombstoned = true;
        let mut holders = Vec::new();
        for (set, state) in record.sets.iter_mut() {
            if let Some(holder) = state.holder() {
                holders.push((*set, holder));
            }
            *state = AuthorityState::Unowned;
        }
        holders
    }

    pub fn is_tombstoned(&self, entity: &EntityId) -> bool {
        self.record(entity, "is_tombstoned")
            .map(|record| record.lock().tombstoned)
            .unwrap_or(false)
    }

    /// Sets of `entity` that `worker` may currently write
    pub fn sets_writable_by(&self, entity: &EntityId, worker: WorkerId) -> Vec<ComponentSetId> {
        let Ok(record) = self.record(entity, "sets_writable_by") else {
            return Vec::new();
        };
        let record = record.lock();
        record
            .sets
            .iter()
            .filter(|(_, state)| state.writer() == Some(worker))
            .map(|(set, _)| *set)
            .collect()
    }

    /// Workers holding or pending authority over any set of `entity`
    pub fn holders(&self, entity: &EntityId) -> Vec<WorkerId> {
        let Ok(record) = self.record(entity, "holders") else {
            return Vec::new();
        };
        let record = record.lock();
        let mut holders: Vec<WorkerId> = record
            .sets
            .values()
            .filter_map(AuthorityState::holder)
            .collect();
        holders.sort();
        holders.dedup();
        holders
    }

    /// Entities where `worker` holds or is pending authority over any set
    pub fn entities_held_by(&self, worker: WorkerId) -> Vec<EntityId> {
        let records: Vec<(EntityId, Arc<Mutex<EntityAuthority>>)> = self
            .records
            .read()
            .iter()
            .map(|(entity, record)| (*entity, record.clone()))
            .collect();
        let mut entities: Vec<EntityId> = records
            .into_iter()
            .filter(|(_, record)| {
                record
                    .lock()
                    .sets
                    .values()
                    .any(|state| state.holder() == Some(worker))
            })
            .map(|(entity, _)| entity)
            .collect();
        entities.sort();
        entities
    }

    /// Records in `PendingGrant`, for the coordinator to retry each tick
    pub fn pending_grants(&self) -> Vec<(EntityId, ComponentSetId, WorkerId)> {
        let records: Vec<(EntityId, Arc<Mutex<EntityAuthority>>)> = self
            .records
            .read()
            .iter()
            .map(|(entity, record)| (*entity, record.clone()))
            .collect();
        let mut pending = Vec::new();
        for (entity, record) in records {
            let record = record.lock();
            for (set, state) in record.sets.iter() {
                if let AuthorityState::PendingGrant { requester } = state {
                    pending.push((entity, *set, *requester));
                }
            }
        }
        pending.sort();
        pending
    }
}
