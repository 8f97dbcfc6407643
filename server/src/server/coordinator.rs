use std::{collections::BTreeMap, mem, sync::Arc, time::Instant};

use crossbeam_channel::Receiver;
use log::{debug, info, trace, warn};
use rayon::prelude::*;

use mosaic_shared::{
    transport::ConnectionSession, AuthorityError, AuthorityManager, AuthorityState,
    ComponentData, ComponentKind, ComponentSetId, ComponentStore, DownstreamOp, EntityId,
    InterestQuery, Protocol, RpcEnvelope, StoreDelta, UpstreamOp, Version, WorkerId,
};

use crate::{
    connection::{Connection, InboundBatch},
    events::CoordinatorEvents,
    interest::InterestManager,
    lifecycle::{EntityLifecycle, LifecycleError},
    CoordinatorError, ServerConfig,
};

/// The coordinating service. Holds the authoritative view of every entity,
/// decides which worker sees what, arbitrates authority and forwards RPCs to
/// the worker that owns their target.
///
/// Everything is driven by [`Coordinator::tick`]: inbound packets are drained
/// (one consumer per connection, in parallel when configured), store deltas
/// are fanned out, interest is recomputed for whatever changed, pending
/// grants are assigned and finally every connection's queue is flushed.
pub struct Coordinator {
    config: ServerConfig,
    protocol: Arc<Protocol>,
    store: Arc<ComponentStore>,
    authority: Arc<AuthorityManager>,
    deltas: Receiver<StoreDelta>,
    interest: InterestManager,
    lifecycle: EntityLifecycle,
    connections: BTreeMap<WorkerId, Connection>,
    next_worker: u32,
    // answers held back until the entity they refer to has been sent
    deferred_responses: Vec<(WorkerId, DownstreamOp)>,
    events: CoordinatorEvents,
}

impl Coordinator {
    /// Create a new Coordinator
    pub fn new(config: ServerConfig, protocol: Protocol) -> Self {
        let mut protocol = protocol;
        if !protocol.is_locked() {
            protocol.lock();
        }
        let protocol = Arc::new(protocol);
        let store = Arc::new(ComponentStore::new());
        let deltas = store.subscribe();
        let authority = Arc::new(AuthorityManager::new(protocol.clone()));
        let interest = InterestManager::new(config.interest.clone());
        let lifecycle = EntityLifecycle::new(config.reservation_ttl, config.rpc.drain_duration());

        Self {
            config,
            protocol,
            store,
            authority,
            deltas,
            interest,
            lifecycle,
            connections: BTreeMap::new(),
            next_worker: 0,
            deferred_responses: Vec::new(),
            events: CoordinatorEvents::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    pub fn authority(&self) -> &AuthorityManager {
        &self.authority
    }

    pub fn interest(&self) -> &InterestManager {
        &self.interest
    }

    pub fn lifecycle(&self) -> &EntityLifecycle {
        &self.lifecycle
    }

    // Connections

    /// Accepts a worker session and assigns it a worker id. The worker learns
    /// its id from the `Welcome` op sent on the next tick.
    pub fn connect<S: ConnectionSession + 'static>(&mut self, session: S) -> WorkerId {
        self.next_worker += 1;
        let worker = WorkerId::new(self.next_worker);
        let mut connection = Connection::new(worker, Box::new(session));
        connection.queue(DownstreamOp::Welcome { worker });
        self.connections.insert(worker, connection);
        self.interest.add_worker(worker);
        self.events.push_connection(worker);
        info!("{} connected", worker);
        worker
    }

    /// Tears down a worker's connection. Its authority is revoked and queued
    /// for reassignment, the entities themselves are kept.
    pub fn disconnect(&mut self, worker: &WorkerId) {
        let Some(mut connection) = self.connections.remove(worker) else {
            return;
        };
        connection.close();

        for (entity, _) in self.authority.revoke_worker(*worker) {
            self.interest.mark_entity_dirty(entity);
        }
        self.interest.remove_worker(worker);
        self.lifecycle.drop_worker(worker);
        self.deferred_responses
            .retain(|(recipient, _)| recipient != worker);
        for connection in self.connections.values_mut() {
            connection.queue(DownstreamOp::WorkerLeft { worker: *worker });
        }
        self.events
            .push_reassignments(self.authority.take_reassignments());
        self.events.push_disconnection(*worker);
        info!("{} disconnected", worker);
    }

    pub fn workers(&self) -> Vec<WorkerId> {
        self.connections.keys().copied().collect()
    }

    pub fn is_connected(&self, worker: &WorkerId) -> bool {
        self.connections.contains_key(worker)
    }

    /// Replaces a worker's interest queries, effective on the next tick
    pub fn set_interest(
        &mut self,
        worker: WorkerId,
        queries: Vec<InterestQuery>,
    ) -> Result<(), CoordinatorError> {
        if !self.connections.contains_key(&worker) {
            return Err(CoordinatorError::UnknownWorker { worker });
        }
        self.interest.set_interest(worker, queries);
        Ok(())
    }

    pub fn take_events(&mut self) -> CoordinatorEvents {
        mem::replace(&mut self.events, CoordinatorEvents::new())
    }

    // Entities

    /// Spawns an entity owned by nobody, with an id from the coordinator's
    /// allocator
    pub fn spawn_entity(
        &mut self,
        components: Vec<ComponentData>,
    ) -> Result<EntityId, CoordinatorError> {
        self.check_kinds(&components)?;
        let entity = self.lifecycle.allocate()?;
        self.authority.try_register_entity(entity)?;
        if let Err(err) = self.store.insert_entity(entity, components) {
            self.authority.deregister_entity(&entity);
            return Err(err.into());
        }
        debug!("Spawned {}", entity);
        Ok(entity)
    }

    /// Writes a component as the coordinator. Delegable kinds may only be
    /// written while no worker owns their set. Returns the new version.
    pub fn write_component(
        &mut self,
        entity: EntityId,
        kind: ComponentKind,
        state: Vec<u8>,
    ) -> Result<Version, CoordinatorError> {
        if let Some(holder) = self.authority.writer_of(&entity, &kind) {
            let set = self
                .protocol
                .set_of(&kind)
                .ok_or(AuthorityError::CoordinatorOwned { entity, kind })?;
            return Err(AuthorityError::Contended {
                entity,
                set,
                holder,
            }
            .into());
        }
        let version = self
            .store
            .get(&entity, &kind)
            .map(|component| component.version + 1)
            .unwrap_or(1);
        self.store
            .upsert(entity, kind, state, version)
            .into_result(entity, kind, version)?;
        Ok(version)
    }

    pub fn remove_component(&mut self, entity: EntityId, kind: ComponentKind) -> bool {
        self.store.remove_component(entity, kind)
    }

    /// Deletes an entity. Authority and interest drop it immediately, every
    /// worker that saw it is told, and the id drains for the RPC retry window
    /// before it is retired. Ids are never reused.
    pub fn delete_entity(&mut self, now: Instant, entity: EntityId) -> Result<(), LifecycleError> {
        if self.lifecycle.is_draining(&entity) {
            return Err(LifecycleError::EntityDraining { entity });
        }
        if !self.store.contains(&entity) {
            return Err(LifecycleError::EntityNotFound { entity });
        }

        for (set, holder) in self.authority.tombstone(entity) {
            debug!("{} loses {}/{} to deletion", holder, entity, set);
        }
        for worker in self.interest.forget_entity(&entity) {
            self.queue(
                worker,
                DownstreamOp::RemoveEntity {
                    entity,
                    deleted: true,
                },
            );
        }
        self.store.remove(entity);
        self.lifecycle.begin_drain(now, entity);
        self.events.push_delete(entity);
        info!("Deleted {}", entity);
        Ok(())
    }

    // Authority

    /// Hands `set` of `entity` to `worker` on the next tick. The worker must
    /// be interested in the entity and the set must be unowned.
    pub fn assign_authority(
        &mut self,
        entity: EntityId,
        set: ComponentSetId,
        worker: WorkerId,
    ) -> Result<(), CoordinatorError> {
        if !self.connections.contains_key(&worker) {
            return Err(CoordinatorError::UnknownWorker { worker });
        }
        let has_interest = self.interest.has_interest(&worker, &entity);
        self.authority
            .request_grant(entity, set, worker, has_interest)?;
        // authority widens what the worker receives of the entity
        self.interest.mark_entity_dirty(entity);
        Ok(())
    }

    /// Takes `set` of `entity` away from its owner
    pub fn revoke_authority(
        &mut self,
        entity: EntityId,
        set: ComponentSetId,
    ) -> Result<WorkerId, CoordinatorError> {
        let transition = self.authority.assign_release(entity, set)?;
        self.queue(
            transition.worker,
            DownstreamOp::AuthorityChange {
                entity,
                set,
                authoritative: false,
                sequence: transition.sequence,
            },
        );
        self.interest.mark_entity_dirty(entity);
        self.events
            .push_auth_release(transition.worker, entity, set);
        Ok(transition.worker)
    }

    // Tick

    pub fn tick(&mut self, now: Instant) {
        self.receive_all_packets(now);
        self.expire(now);
        self.fan_out_deltas();
        self.update_interest();
        self.assign_pending_grants();
        for (worker, response) in mem::take(&mut self.deferred_responses) {
            self.queue(worker, response);
        }
        self.send_all_packets();
    }

    fn receive_all_packets(&mut self, now: Instant) {
        let store = self.store.clone();
        let authority = self.authority.clone();
        let mut batches: Vec<(WorkerId, InboundBatch)> = if self.config.parallel_inbound {
            self.connections
                .par_iter_mut()
                .map(|(worker, connection)| {
                    (*worker, connection.process_inbound(&store, &authority))
                })
                .collect()
        } else {
            self.connections
                .iter_mut()
                .map(|(worker, connection)| {
                    (*worker, connection.process_inbound(&store, &authority))
                })
                .collect()
        };
        batches.sort_by_key(|(worker, _)| *worker);

        let mut closed = Vec::new();
        for (worker, batch) in batches {
            for error in batch.errors {
                self.events.push_error(worker, error);
            }
            for op in batch.deferred {
                self.handle_op(now, worker, op);
            }
            for (entity, kind) in batch.rejected {
                self.reset_component(worker, entity, kind);
            }
            if batch.closed {
                closed.push(worker);
            }
        }
        for worker in closed {
            self.disconnect(&worker);
        }
    }

    fn handle_op(&mut self, now: Instant, worker: WorkerId, op: UpstreamOp) {
        match op {
            UpstreamOp::RequestAuthority { entity, set } => {
                self.handle_authority_request(worker, entity, set)
            }
            UpstreamOp::ReleaseAuthority { entity, set } => {
                self.handle_authority_release(worker, entity, set)
            }
            UpstreamOp::SetInterest { queries } => self.interest.set_interest(worker, queries),
            UpstreamOp::Rpc(envelope) => self.forward_rpc(worker, envelope),
            UpstreamOp::RpcAck {
                sender,
                target,
                kind,
                sequence,
            } => {
                trace!(
                    "Routing ack {}/{} seq {} from {} to {}",
                    target,
                    kind,
                    sequence,
                    worker,
                    sender
                );
                self.queue(
                    sender,
                    DownstreamOp::RpcAck {
                        target,
                        kind,
                        sequence,
                    },
                );
            }
            UpstreamOp::ReserveEntityIds { count } => {
                match self.lifecycle.reserve(now, worker, count) {
                    Ok(first) => self.queue(
                        worker,
                        DownstreamOp::ReserveEntityIdsResponse {
                            first,
                            count,
                            ttl: self.config.reservation_ttl,
                        },
                    ),
                    Err(err) => {
                        warn!("Refused reservation from {}: {}", worker, err);
                        self.events.push_rejection(worker, err);
                        self.queue(
                            worker,
                            DownstreamOp::ReserveEntityIdsResponse {
                                first: EntityId::new(0),
                                count: 0,
                                ttl: self.config.reservation_ttl,
                            },
                        );
                    }
                }
            }
            UpstreamOp::CreateEntity { entity, components } => {
                let accepted = match self.create_for(now, worker, entity, components) {
                    Ok(()) => {
                        self.events.push_create(worker, entity);
                        true
                    }
                    Err(err) => {
                        warn!("Refused creation of {} by {}: {}", entity, worker, err);
                        self.events.push_rejection(worker, err);
                        false
                    }
                };
                self.deferred_responses
                    .push((worker, DownstreamOp::CreateEntityResponse { entity, accepted }));
            }
            UpstreamOp::DeleteEntity { entity } => {
                let result = self
                    .check_delete(worker, entity)
                    .and_then(|_| self.delete_entity(now, entity));
                let accepted = match result {
                    Ok(()) => true,
                    Err(err) => {
                        warn!("Refused deletion of {} by {}: {}", entity, worker, err);
                        self.events.push_rejection(worker, err);
                        false
                    }
                };
                self.queue(worker, DownstreamOp::DeleteEntityResponse { entity, accepted });
            }
            UpstreamOp::AddComponent { .. }
            | UpstreamOp::UpdateComponent { .. }
            | UpstreamOp::RemoveComponent { .. } => {
                warn!("Write from {} reached the deferred queue", worker);
            }
        }
    }

    fn handle_authority_request(
        &mut self,
        worker: WorkerId,
        entity: EntityId,
        set: ComponentSetId,
    ) {
        let has_interest = self.interest.has_interest(&worker, &entity);
        match self
            .authority
            .request_grant(entity, set, worker, has_interest)
        {
            Ok(()) => self.interest.mark_entity_dirty(entity),
            Err(err) => {
                debug!("Denied {}/{} to {}: {}", entity, set, worker, err);
                self.queue(worker, DownstreamOp::AuthorityDenied { entity, set });
                self.events.push_error(worker, err.into());
            }
        }
    }

    fn handle_authority_release(
        &mut self,
        worker: WorkerId,
        entity: EntityId,
        set: ComponentSetId,
    ) {
        let was_pending = matches!(
            self.authority.state(&entity, &set),
            Some(AuthorityState::PendingGrant { .. })
        );
        if let Err(err) = self.authority.begin_release(entity, set, worker) {
            debug!("Ignored release of {}/{} by {}: {}", entity, set, worker, err);
            self.events.push_error(worker, err.into());
            return;
        }
        if was_pending {
            debug!("{} withdrew its request for {}/{}", worker, entity, set);
            self.interest.mark_entity_dirty(entity);
            return;
        }
        match self.authority.assign_release(entity, set) {
            Ok(transition) => {
                self.queue(
                    transition.worker,
                    DownstreamOp::AuthorityChange {
                        entity,
                        set,
                        authoritative: false,
                        sequence: transition.sequence,
                    },
                );
                self.interest.mark_entity_dirty(entity);
                self.events
                    .push_auth_release(transition.worker, entity, set);
            }
            Err(err) => warn!("Release of {}/{} failed: {}", entity, set, err),
        }
    }

    /// Puts a worker's copy of a component back in line with the store after
    /// one of its writes was rejected. The worker already applied that write
    /// locally.
    fn reset_component(&mut self, worker: WorkerId, entity: EntityId, kind: ComponentKind) {
        if !self.interest.has_interest(&worker, &entity) {
            return;
        }
        let current = self
            .store
            .get(&entity, &kind)
            .filter(|_| self.interest.delivers(&worker, &entity, &kind));
        match current {
            Some(component) => {
                debug!("Resetting {}/{} on {} to v{}", entity, kind, worker, component.version);
                self.queue(worker, DownstreamOp::ResetComponent { entity, component });
            }
            None if self.store.contains(&entity) => {
                self.queue(worker, DownstreamOp::RemoveComponent { entity, kind });
            }
            // deleted, its removal reaches the worker through interest
            None => {}
        }
    }

    /// Delivers an RPC to the worker owning the set of its component kind.
    /// Without an owner the RPC is dropped and the sender's retries run out.
    fn forward_rpc(&mut self, sender: WorkerId, envelope: RpcEnvelope) {
        let owner = self
            .protocol
            .set_of(&envelope.kind)
            .and_then(|set| self.authority.state(&envelope.target, &set))
            .and_then(|state| state.writer())
            .filter(|owner| self.connections.contains_key(owner));
        match owner {
            Some(owner) => self.queue(owner, DownstreamOp::Rpc { sender, envelope }),
            None => {
                warn!(
                    "No authoritative worker for RPC {} on {}/{} from {}, dropping",
                    envelope.command, envelope.target, envelope.kind, sender
                );
                self.events.push_dropped_rpc();
            }
        }
    }

    fn create_for(
        &mut self,
        now: Instant,
        worker: WorkerId,
        entity: EntityId,
        components: Vec<ComponentData>,
    ) -> Result<(), LifecycleError> {
        self.check_kinds(&components)?;
        self.lifecycle.claim(now, worker, entity)?;
        self.authority.try_register_entity(entity)?;

        // the creator starts out requesting every delegable set it supplied
        let mut sets: Vec<ComponentSetId> = components
            .iter()
            .filter_map(|component| self.protocol.set_of(&component.kind))
            .collect();
        sets.sort();
        sets.dedup();
        for set in sets {
            self.authority.request_grant(entity, set, worker, true)?;
        }

        if let Err(err) = self.store.insert_entity(entity, components) {
            self.authority.deregister_entity(&entity);
            return Err(err.into());
        }
        info!("{} created {}", worker, entity);
        Ok(())
    }

    fn check_delete(&self, worker: WorkerId, entity: EntityId) -> Result<(), LifecycleError> {
        if !self.interest.has_interest(&worker, &entity) {
            return Err(LifecycleError::NotVisible { entity, worker });
        }
        match self
            .authority
            .holders(&entity)
            .into_iter()
            .find(|holder| *holder != worker)
        {
            Some(holder) => Err(LifecycleError::DeleteNotPermitted {
                entity,
                worker,
                holder,
            }),
            None => Ok(()),
        }
    }

    fn check_kinds(&self, components: &[ComponentData]) -> Result<(), LifecycleError> {
        match components
            .iter()
            .find(|component| !self.protocol.is_registered(&component.kind))
        {
            Some(component) => Err(LifecycleError::UnknownComponent {
                kind: component.kind,
            }),
            None => Ok(()),
        }
    }

    fn expire(&mut self, now: Instant) {
        self.lifecycle.expire_reservations(now);
        for entity in self.lifecycle.retire_expired(now) {
            self.authority.deregister_entity(&entity);
            self.events.push_retirement(entity);
        }
    }

    fn fan_out_deltas(&mut self) {
        let deltas: Vec<StoreDelta> = self.deltas.try_iter().collect();
        for delta in deltas {
            self.interest.on_store_delta(&delta);
            let (entity, kind, op) = match delta {
                StoreDelta::ComponentAdded { entity, component } => (
                    entity,
                    component.kind,
                    DownstreamOp::AddComponent { entity, component },
                ),
                StoreDelta::ComponentUpdated { entity, component } => (
                    entity,
                    component.kind,
                    DownstreamOp::UpdateComponent { entity, component },
                ),
                StoreDelta::ComponentRemoved { entity, kind } => {
                    (entity, kind, DownstreamOp::RemoveComponent { entity, kind })
                }
                // entity arrival and departure are announced through interest
                StoreDelta::EntityAdded { .. } | StoreDelta::EntityRemoved { .. } => continue,
            };
            for worker in self.interest.interested_workers(&entity) {
                if self.interest.delivers(&worker, &entity, &kind) {
                    self.queue(worker, op.clone());
                }
            }
        }
    }

    fn update_interest(&mut self) {
        let changes = self.interest.recompute(&self.store, &self.authority);
        for (worker, changes) in changes {
            if !self.connections.contains_key(&worker) {
                continue;
            }
            for entity in changes.leaving {
                self.queue(
                    worker,
                    DownstreamOp::RemoveEntity {
                        entity,
                        deleted: false,
                    },
                );
            }
            for entity in changes.entering {
                self.send_entity(worker, entity);
            }
            for change in changes.refiltered {
                for kind in change.removed {
                    self.queue(
                        worker,
                        DownstreamOp::RemoveComponent {
                            entity: change.entity,
                            kind,
                        },
                    );
                }
                for kind in change.added {
                    if let Some(component) = self.store.get(&change.entity, &kind) {
                        self.queue(
                            worker,
                            DownstreamOp::AddComponent {
                                entity: change.entity,
                                component,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Queues the full replication burst for an entity entering a worker's view
    fn send_entity(&mut self, worker: WorkerId, entity: EntityId) {
        let Some(snapshot) = self.store.entity_snapshot(&entity) else {
            return;
        };
        let components: Vec<ComponentData> = snapshot
            .into_iter()
            .filter(|component| self.interest.delivers(&worker, &entity, &component.kind))
            .collect();
        self.queue(worker, DownstreamOp::AddEntity { entity });
        for component in components {
            self.queue(worker, DownstreamOp::AddComponent { entity, component });
        }
        self.queue(worker, DownstreamOp::InitialStateComplete { entity });
    }

    fn assign_pending_grants(&mut self) {
        for (entity, set, requester) in self.authority.pending_grants() {
            let interest = &self.interest;
            let result = self
                .authority
                .assign_grant(entity, set, &|worker| interest.has_interest(&worker, &entity));
            match result {
                Ok(transition) => {
                    self.queue(
                        transition.worker,
                        DownstreamOp::AuthorityChange {
                            entity,
                            set,
                            authoritative: true,
                            sequence: transition.sequence,
                        },
                    );
                    self.events
                        .push_auth_grant(transition.worker, entity, set);
                }
                Err(AuthorityError::NoInterest { .. }) => {
                    trace!("Grant of {}/{} to {} waits for interest", entity, set, requester);
                }
                Err(err) => debug!("Grant of {}/{} failed: {}", entity, set, err),
            }
        }
    }

    fn send_all_packets(&mut self) {
        let mut failed = Vec::new();
        for (worker, connection) in self.connections.iter_mut() {
            if let Err(err) = connection.flush() {
                warn!("Sending to {} failed: {}", worker, err);
                failed.push(*worker);
            }
        }
        for worker in failed {
            self.disconnect(&worker);
        }
    }

    fn queue(&mut self, worker: WorkerId, op: DownstreamOp) {
        match self.connections.get_mut(&worker) {
            Some(connection) => connection.queue(op),
            None => trace!("Dropping op for departed {}", worker),
        }
    }
}
