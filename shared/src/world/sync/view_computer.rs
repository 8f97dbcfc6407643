use std::collections::HashMap;

use log::{debug, info, trace, warn};

use super::{
    entity_channel::{EntityChannel, StagedAuthority},
    ViewEvent,
};
use crate::{
    world::{delegation::AuthorityError, delegation::AuthorityManager, store::ComponentStore},
    ComponentData, ComponentSetId, DownstreamOp, EntityId, WorkerId, WriteOutcome,
};

/// Turns the coordinator's op stream into view events for one worker.
///
/// Ops are applied in arrival order per entity. Newly added entities are
/// staged until `InitialStateComplete` and then committed to the store in one
/// step. Within a batch, an entity that appears and disappears again produces
/// no events at all.
pub struct ViewDeltaComputer {
    local_worker: WorkerId,
    channels: HashMap<EntityId, EntityChannel>,
}

impl ViewDeltaComputer {
    pub fn new(local_worker: WorkerId) -> Self {
        Self {
            local_worker,
            channels: HashMap::new(),
        }
    }

    pub fn local_worker(&self) -> WorkerId {
        self.local_worker
    }

    pub fn set_local_worker(&mut self, worker: WorkerId) {
        self.local_worker = worker;
    }

    /// Entity was committed and is visible to the application
    pub fn is_visible(&self, entity: &EntityId) -> bool {
        self.channels
            .get(entity)
            .map(EntityChannel::is_live)
            .unwrap_or(false)
    }

    pub fn is_staging(&self, entity: &EntityId) -> bool {
        matches!(self.channels.get(entity), Some(EntityChannel::Staging(_)))
    }

    /// Applies one inbound batch. Ops that do not concern the view are skipped.
    pub fn process_batch(
        &mut self,
        ops: Vec<DownstreamOp>,
        store: &ComponentStore,
        authority: &AuthorityManager,
    ) -> Vec<ViewEvent> {
        let mut events = Vec::new();
        let mut visible_at_start: HashMap<EntityId, bool> = HashMap::new();

        for op in ops {
            let Some(entity) = op.view_entity() else {
                trace!("View computer skipping non-view op {:?}", op);
                continue;
            };
            visible_at_start
                .entry(entity)
                .or_insert_with(|| self.is_visible(&entity));
            self.process_op(op, store, authority, &mut events);
        }

        // entities that came and went inside this batch were never observable
        let flickered: Vec<EntityId> = visible_at_start
            .into_iter()
            .filter(|(entity, was_visible)| !was_visible && !self.is_visible(entity))
            .map(|(entity, _)| entity)
            .collect();
        if !flickered.is_empty() {
            events.retain(|event| match event.entity() {
                Some(entity) => !flickered.contains(&entity),
                None => true,
            });
        }
        events
    }

    fn process_op(
        &mut self,
        op: DownstreamOp,
        store: &ComponentStore,
        authority: &AuthorityManager,
        events: &mut Vec<ViewEvent>,
    ) {
        match op {
            DownstreamOp::AddEntity { entity } => {
                if store.is_tombstoned(&entity) {
                    info!("Ignoring AddEntity for deleted {}", entity);
                    return;
                }
                if self.is_visible(&entity) {
                    warn!("AddEntity for visible {}, restaging", entity);
                }
                self.channels.insert(entity, EntityChannel::staging());
            }
            DownstreamOp::AddComponent { entity, component } => match self.channels.get_mut(&entity) {
                Some(EntityChannel::Staging(staged)) => staged.add_component(component),
                Some(EntityChannel::Live) => {
                    let existed = store.get(&entity, &component.kind).is_some();
                    if store
                        .upsert(entity, component.kind, component.state.clone(), component.version)
                        .is_applied()
                    {
                        // an add over an existing component is a refresh
                        events.push(if existed {
                            ViewEvent::ComponentUpdated { entity, component }
                        } else {
                            ViewEvent::ComponentAdded { entity, component }
                        });
                    }
                }
                None => debug!("Dropping component add for unknown {}", entity),
            },
            DownstreamOp::UpdateComponent { entity, component } => {
                match self.channels.get_mut(&entity) {
                    Some(EntityChannel::Staging(staged)) => staged.update_component(component),
                    Some(EntityChannel::Live) => {
                        let existed = store.get(&entity, &component.kind).is_some();
                        let outcome = store.upsert(
                            entity,
                            component.kind,
                            component.state.clone(),
                            component.version,
                        );
                        if outcome == WriteOutcome::Applied {
                            events.push(if existed {
                                ViewEvent::ComponentUpdated { entity, component }
                            } else {
                                ViewEvent::ComponentAdded { entity, component }
                            });
                        }
                    }
                    None => debug!("Dropping update for unknown {}", entity),
                }
            }
            DownstreamOp::RemoveComponent { entity, kind } => match self.channels.get_mut(&entity) {
                Some(EntityChannel::Staging(staged)) => staged.remove_component(&kind),
                Some(EntityChannel::Live) => {
                    if store.remove_component(entity, kind) {
                        events.push(ViewEvent::ComponentRemoved { entity, kind });
                    }
                }
                None => debug!("Dropping component removal for unknown {}", entity),
            },
            DownstreamOp::ResetComponent { entity, component } => {
                match self.channels.get_mut(&entity) {
                    Some(EntityChannel::Staging(staged)) => staged.add_component(component),
                    Some(EntityChannel::Live) => {
                        let existed = store.get(&entity, &component.kind).is_some();
                        if store.overwrite(entity, component.clone()).is_applied() {
                            debug!("Reset {}/{} to v{}", entity, component.kind, component.version);
                            events.push(if existed {
                                ViewEvent::ComponentUpdated { entity, component }
                            } else {
                                ViewEvent::ComponentAdded { entity, component }
                            });
                        }
                    }
                    None => debug!("Dropping component reset for unknown {}", entity),
                }
            }
            DownstreamOp::InitialStateComplete { entity } => {
                self.commit(entity, store, authority, events);
            }
            DownstreamOp::RemoveEntity { entity, deleted } => {
                self.remove(entity, deleted, store, authority, events);
            }
            DownstreamOp::AuthorityChange {
                entity,
                set,
                authoritative,
                sequence,
            } => {
                let change = StagedAuthority {
                    set,
                    authoritative,
                    sequence,
                };
                match self.channels.get_mut(&entity) {
                    Some(EntityChannel::Staging(staged)) => {
                        staged.push_authority(change);
                        return;
                    }
                    Some(EntityChannel::Live) => {}
                    None => {
                        debug!("Dropping authority change for unknown {}", entity);
                        return;
                    }
                }
                self.apply_authority(entity, change, authority, events);
            }
            _ => {}
        }
    }

    fn commit(
        &mut self,
        entity: EntityId,
        store: &ComponentStore,
        authority: &AuthorityManager,
        events: &mut Vec<ViewEvent>,
    ) {
        let staged = match self.channels.remove(&entity) {
            Some(EntityChannel::Staging(staged)) => staged,
            Some(EntityChannel::Live) => {
                self.channels.insert(entity, EntityChannel::Live);
                debug!("Duplicate InitialStateComplete for {}", entity);
                return;
            }
            None => {
                warn!("InitialStateComplete for unknown {}", entity);
                return;
            }
        };
        let (components, staged_authority): (Vec<ComponentData>, Vec<StagedAuthority>) =
            staged.into_parts();

        // restaged without a removal, replace the whole entity
        if store.contains(&entity) {
            self.release_local_authority(entity, authority, events);
            store.evict(entity);
            authority.deregister_entity(&entity);
            events.push(ViewEvent::EntityRemoved {
                entity,
                deleted: false,
            });
        }
        if let Err(err) = store.insert_entity(entity, components.clone()) {
            info!("Dropping commit of {}: {}", entity, err);
            return;
        }
        authority.ensure_registered(entity);
        self.channels.insert(entity, EntityChannel::Live);
        events.push(ViewEvent::EntityAdded { entity, components });

        for change in staged_authority {
            self.apply_authority(entity, change, authority, events);
        }
    }

    fn remove(
        &mut self,
        entity: EntityId,
        deleted: bool,
        store: &ComponentStore,
        authority: &AuthorityManager,
        events: &mut Vec<ViewEvent>,
    ) {
        match self.channels.remove(&entity) {
            Some(EntityChannel::Staging(staged)) => {
                debug!(
                    "{} removed before commit, discarding {} queued ops",
                    entity,
                    staged.buffered_ops()
                );
                if deleted {
                    store.remove(entity);
                }
            }
            Some(EntityChannel::Live) => {
                self.release_local_authority(entity, authority, events);
                if deleted {
                    store.remove(entity);
                    authority.tombstone(entity);
                } else {
                    store.evict(entity);
                }
                authority.deregister_entity(&entity);
                events.push(ViewEvent::EntityRemoved { entity, deleted });
            }
            None => {
                if deleted {
                    // tombstone anyway so late updates are dropped
                    store.remove(entity);
                }
            }
        }
    }

    fn apply_authority(
        &self,
        entity: EntityId,
        change: StagedAuthority,
        authority: &AuthorityManager,
        events: &mut Vec<ViewEvent>,
    ) {
        let StagedAuthority {
            set,
            authoritative,
            sequence,
        } = change;
        let result = if authoritative {
            authority.apply_grant(entity, set, self.local_worker, sequence, true)
        } else {
            authority.apply_release(entity, set, sequence)
        };
        let previous = match result {
            Ok(previous) => previous,
            Err(AuthorityError::StaleSequence {
                last_applied,
                attempted,
                ..
            }) => {
                debug!(
                    "Rejected stale authority change for {}/{}: seq {} <= {}",
                    entity, set, attempted, last_applied
                );
                return;
            }
            Err(err) => {
                warn!("Rejected authority change for {}/{}: {}", entity, set, err);
                return;
            }
        };

        let held_before = previous == Some(self.local_worker);
        if held_before {
            // a grant over a held set means authority was lost in between
            Self::push_authority_events(entity, set, false, authority, events);
        }
        if authoritative {
            Self::push_authority_events(entity, set, true, authority, events);
        }
    }

    fn release_local_authority(
        &self,
        entity: EntityId,
        authority: &AuthorityManager,
        events: &mut Vec<ViewEvent>,
    ) {
        for set in authority.sets_writable_by(&entity, self.local_worker) {
            Self::push_authority_events(entity, set, false, authority, events);
        }
    }

    fn push_authority_events(
        entity: EntityId,
        set: ComponentSetId,
        has_authority: bool,
        authority: &AuthorityManager,
        events: &mut Vec<ViewEvent>,
    ) {
        for kind in authority.protocol().kinds_in_set(&set) {
            events.push(ViewEvent::AuthorityChanged {
                entity,
                kind: *kind,
                has_authority,
            });
        }
    }
}
