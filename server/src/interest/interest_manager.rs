use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use log::{debug, trace};

use mosaic_shared::{
    AuthorityManager, ComponentKind, ComponentStore, EntityId, InterestQuery, Position,
    StoreDelta, WorkerId,
};

use super::{InterestConfig, SpatialGrid};

/// Component kinds a worker receives for an entity, `None` meaning every kind
pub type KindFilter = Option<BTreeSet<ComponentKind>>;

/// Kinds of an entity that started or stopped being delivered to a worker
/// which stays interested in it. Only kinds the entity currently has are listed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterChange {
    pub entity: EntityId,
    pub added: Vec<ComponentKind>,
    pub removed: Vec<ComponentKind>,
}

/// Entities entering and leaving one worker's interest, each sorted by id
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterestChanges {
    pub entering: Vec<EntityId>,
    pub leaving: Vec<EntityId>,
    pub refiltered: Vec<FilterChange>,
}

impl InterestChanges {
    pub fn is_empty(&self) -> bool {
        self.entering.is_empty() && self.leaving.is_empty() && self.refiltered.is_empty()
    }
}

struct WorkerInterest {
    queries: Vec<InterestQuery>,
    view: BTreeMap<EntityId, KindFilter>,
}

/// Decides which entities each worker is interested in.
///
/// Work is incremental: query changes mark the worker dirty, store deltas mark
/// entities dirty, and [`InterestManager::recompute`] only re-evaluates those.
/// Entities a worker holds or is requesting authority over always stay in its
/// interest.
pub struct InterestManager {
    config: InterestConfig,
    grid: SpatialGrid,
    workers: HashMap<WorkerId, WorkerInterest>,
    dirty_workers: HashSet<WorkerId>,
    dirty_entities: HashSet<EntityId>,
}

impl InterestManager {
    pub fn new(config: InterestConfig) -> Self {
        let grid = SpatialGrid::new(config.cell_size);
        Self {
            config,
            grid,
            workers: HashMap::new(),
            dirty_workers: HashSet::new(),
            dirty_entities: HashSet::new(),
        }
    }

    pub fn config(&self) -> &InterestConfig {
        &self.config
    }

    pub fn add_worker(&mut self, worker: WorkerId) {
        self.workers.entry(worker).or_insert_with(|| WorkerInterest {
            queries: Vec::new(),
            view: BTreeMap::new(),
        });
    }

    /// Forgets the worker and its view. No leave events are produced.
    pub fn remove_worker(&mut self, worker: &WorkerId) -> bool {
        self.dirty_workers.remove(worker);
        self.workers.remove(worker).is_some()
    }

    /// Replaces the worker's queries. Takes effect on the next recompute.
    pub fn set_interest(&mut self, worker: WorkerId, queries: Vec<InterestQuery>) {
        self.add_worker(worker);
        if let Some(interest) = self.workers.get_mut(&worker) {
            debug!("{} set {} interest queries", worker, queries.len());
            interest.queries = queries;
            self.dirty_workers.insert(worker);
        }
    }

    pub fn queries(&self, worker: &WorkerId) -> &[InterestQuery] {
        self.workers
            .get(worker)
            .map(|interest| interest.queries.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_interest(&self, worker: &WorkerId, entity: &EntityId) -> bool {
        self.workers
            .get(worker)
            .map(|interest| interest.view.contains_key(entity))
            .unwrap_or(false)
    }

    /// Whether `kind` on `entity` is delivered to `worker`
    pub fn delivers(&self, worker: &WorkerId, entity: &EntityId, kind: &ComponentKind) -> bool {
        match self
            .workers
            .get(worker)
            .and_then(|interest| interest.view.get(entity))
        {
            Some(None) => true,
            Some(Some(kinds)) => kinds.contains(kind),
            None => false,
        }
    }

    pub fn kind_filter(&self, worker: &WorkerId, entity: &EntityId) -> Option<&KindFilter> {
        self.workers
            .get(worker)
            .and_then(|interest| interest.view.get(entity))
    }

    /// Workers currently interested in `entity`, sorted
    pub fn interested_workers(&self, entity: &EntityId) -> Vec<WorkerId> {
        let mut workers: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, interest)| interest.view.contains_key(entity))
            .map(|(worker, _)| *worker)
            .collect();
        workers.sort();
        workers
    }

    pub fn mark_entity_dirty(&mut self, entity: EntityId) {
        self.dirty_entities.insert(entity);
    }

    /// Records a change to the world. Structural changes and position updates
    /// mark the entity dirty, other updates do not affect interest.
    pub fn on_store_delta(&mut self, delta: &StoreDelta) {
        let position_kind = self.config.position_kind;
        match delta {
            StoreDelta::EntityAdded { entity, components } => {
                if let Some(kind) = position_kind {
                    if let Some(position) = components
                        .iter()
                        .find(|component| component.kind == kind)
                        .and_then(|component| Position::from_bytes(&component.state))
                    {
                        self.grid.update(*entity, position);
                    }
                }
            }
            StoreDelta::ComponentAdded { entity, component }
            | StoreDelta::ComponentUpdated { entity, component } => {
                if Some(component.kind) != position_kind {
                    if !delta.is_structural() {
                        return;
                    }
                } else if let Some(position) = Position::from_bytes(&component.state) {
                    self.grid.update(*entity, position);
                } else {
                    debug!("{} has malformed position state, unindexed", entity);
                    self.grid.remove(entity);
                }
            }
            StoreDelta::ComponentRemoved { entity, kind } => {
                if Some(*kind) == position_kind {
                    self.grid.remove(entity);
                }
            }
            StoreDelta::EntityRemoved { entity, .. } => {
                self.grid.remove(entity);
            }
        }
        self.dirty_entities.insert(delta.entity());
    }

    /// Drops a deleted entity from every view and the spatial index without
    /// reporting it as leaving. The caller announces the deletion itself.
    pub fn forget_entity(&mut self, entity: &EntityId) -> Vec<WorkerId> {
        self.grid.remove(entity);
        self.dirty_entities.remove(entity);
        let mut removed_from = Vec::new();
        for (worker, interest) in self.workers.iter_mut() {
            if interest.view.remove(entity).is_some() {
                removed_from.push(*worker);
            }
        }
        removed_from.sort();
        removed_from
    }

    /// Re-evaluates dirty workers and entities. Returns the changes per
    /// worker, omitting workers whose interest did not change. Calling it
    /// again without intervening changes returns nothing.
    pub fn recompute(
        &mut self,
        store: &ComponentStore,
        authority: &AuthorityManager,
    ) -> BTreeMap<WorkerId, InterestChanges> {
        let mut changes: BTreeMap<WorkerId, InterestChanges> = BTreeMap::new();
        let dirty_workers: Vec<WorkerId> = self.dirty_workers.drain().collect();
        let mut dirty_entities: Vec<EntityId> = self.dirty_entities.drain().collect();
        dirty_entities.sort();

        for worker in &dirty_workers {
            let worker_changes = self.recompute_worker(*worker, store, authority);
            if !worker_changes.is_empty() {
                changes.insert(*worker, worker_changes);
            }
        }

        let mut other_workers: Vec<WorkerId> = self
            .workers
            .keys()
            .filter(|worker| !dirty_workers.contains(worker))
            .copied()
            .collect();
        other_workers.sort();

        for entity in dirty_entities {
            let live = store.contains(&entity);
            let kinds = store.component_kinds(&entity);
            let holders = authority.holders(&entity);
            for worker in &other_workers {
                let Some(interest) = self.workers.get_mut(worker) else {
                    continue;
                };
                let filter = if live {
                    evaluate(
                        &interest.queries,
                        &entity,
                        self.grid.position(&entity),
                        &kinds,
                        holders.contains(worker),
                    )
                } else {
                    None
                };
                let was_in = interest.view.contains_key(&entity);
                match filter {
                    Some(filter) => {
                        match interest.view.insert(entity, filter.clone()) {
                            None => changes.entry(*worker).or_default().entering.push(entity),
                            Some(previous) => {
                                if let Some(change) = filter_change(entity, &previous, &filter, &kinds)
                                {
                                    changes.entry(*worker).or_default().refiltered.push(change);
                                }
                            }
                        }
                    }
                    None => {
                        if was_in {
                            interest.view.remove(&entity);
                            changes.entry(*worker).or_default().leaving.push(entity);
                        }
                    }
                }
            }
        }

        for (worker, worker_changes) in changes.iter_mut() {
            worker_changes.entering.sort();
            worker_changes.leaving.sort();
            worker_changes.refiltered.sort_by_key(|change| change.entity);
            trace!(
                "{} interest: {} entering, {} leaving, {} refiltered",
                worker,
                worker_changes.entering.len(),
                worker_changes.leaving.len(),
                worker_changes.refiltered.len()
            );
        }
        changes
    }

    fn recompute_worker(
        &mut self,
        worker: WorkerId,
        store: &ComponentStore,
        authority: &AuthorityManager,
    ) -> InterestChanges {
        let Some(interest) = self.workers.get(&worker) else {
            return InterestChanges::default();
        };

        let mut candidates: BTreeSet<EntityId> = BTreeSet::new();
        let mut scanned_all = false;
        for query in &interest.queries {
            match query.constraint.spatial_bounds() {
                Some((min, max)) => candidates.extend(self.grid.query(&min, &max)),
                None if !scanned_all => {
                    candidates.extend(store.entities());
                    scanned_all = true;
                }
                None => {}
            }
        }
        let held: BTreeSet<EntityId> = authority.entities_held_by(worker).into_iter().collect();
        candidates.extend(held.iter().copied());

        let mut view: BTreeMap<EntityId, KindFilter> = BTreeMap::new();
        let mut refiltered = Vec::new();
        for entity in candidates {
            if !store.contains(&entity) {
                continue;
            }
            let kinds = store.component_kinds(&entity);
            if let Some(filter) = evaluate(
                &interest.queries,
                &entity,
                self.grid.position(&entity),
                &kinds,
                held.contains(&entity),
            ) {
                if let Some(previous) = interest.view.get(&entity) {
                    refiltered.extend(filter_change(entity, previous, &filter, &kinds));
                }
                view.insert(entity, filter);
            }
        }

        let Some(interest) = self.workers.get_mut(&worker) else {
            return InterestChanges::default();
        };
        let entering = view
            .keys()
            .filter(|entity| !interest.view.contains_key(entity))
            .copied()
            .collect();
        let leaving = interest
            .view
            .keys()
            .filter(|entity| !view.contains_key(entity))
            .copied()
            .collect();
        interest.view = view;
        InterestChanges {
            entering,
            leaving,
            refiltered,
        }
    }
}

fn filter_change(
    entity: EntityId,
    previous: &KindFilter,
    current: &KindFilter,
    kinds: &[ComponentKind],
) -> Option<FilterChange> {
    if previous == current {
        return None;
    }
    let passes = |filter: &KindFilter, kind: &ComponentKind| match filter {
        None => true,
        Some(allowed) => allowed.contains(kind),
    };
    let mut change = FilterChange {
        entity,
        added: Vec::new(),
        removed: Vec::new(),
    };
    for kind in kinds {
        match (passes(previous, kind), passes(current, kind)) {
            (false, true) => change.added.push(*kind),
            (true, false) => change.removed.push(*kind),
            _ => {}
        }
    }
    if change.added.is_empty() && change.removed.is_empty() {
        return None;
    }
    Some(change)
}

fn evaluate(
    queries: &[InterestQuery],
    entity: &EntityId,
    position: Option<&Position>,
    kinds: &[ComponentKind],
    holds_authority: bool,
) -> Option<KindFilter> {
    let has_kind = |kind: &ComponentKind| kinds.contains(kind);
    let mut matched = holds_authority;
    let mut all_kinds = holds_authority;
    let mut filter: BTreeSet<ComponentKind> = BTreeSet::new();
    for query in queries {
        if !query.constraint.matches(entity, position, &has_kind) {
            continue;
        }
        matched = true;
        match &query.result_kinds {
            None => all_kinds = true,
            Some(result_kinds) => filter.extend(result_kinds.iter().copied()),
        }
    }
    if !matched {
        return None;
    }
    Some(if all_kinds { None } else { Some(filter) })
}
