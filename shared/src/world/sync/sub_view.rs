use std::collections::BTreeSet;

use log::debug;

use super::ViewEvent;
use crate::{
    world::{delegation::AuthorityManager, store::ComponentStore},
    ComponentData, ComponentKind, EntityId, WorkerId,
};

/// Read access to one worker's view, handed to sub view filters
pub struct ViewContext<'a> {
    store: &'a ComponentStore,
    authority: &'a AuthorityManager,
    worker: Option<WorkerId>,
}

impl<'a> ViewContext<'a> {
    pub fn new(
        store: &'a ComponentStore,
        authority: &'a AuthorityManager,
        worker: Option<WorkerId>,
    ) -> Self {
        Self {
            store,
            authority,
            worker,
        }
    }

    pub fn store(&self) -> &ComponentStore {
        self.store
    }

    pub fn get(&self, entity: &EntityId, kind: &ComponentKind) -> Option<ComponentData> {
        self.store.get(entity, kind)
    }

    pub fn has_component(&self, entity: &EntityId, kind: &ComponentKind) -> bool {
        self.store.get(entity, kind).is_some()
    }

    /// This worker may write `kind` on `entity`
    pub fn has_authority(&self, entity: &EntityId, kind: &ComponentKind) -> bool {
        match self.worker {
            Some(worker) => self.authority.writer_of(entity, kind) == Some(worker),
            None => false,
        }
    }
}

pub type SubViewFilter = Box<dyn Fn(EntityId, &ViewContext<'_>) -> bool + Send>;

/// Which events make a sub view check an entity against its filter again
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// `kind` was added to or removed from the entity
    ComponentExistence(ComponentKind),
    /// `kind` changed state
    ComponentChanged(ComponentKind),
    /// This worker gained or lost authority over `kind`
    AuthorityChanged(ComponentKind),
}

impl RefreshTrigger {
    fn matches(&self, event: &ViewEvent) -> bool {
        match (self, event) {
            (Self::ComponentExistence(kind), ViewEvent::ComponentAdded { component, .. }) => {
                component.kind == *kind
            }
            (Self::ComponentExistence(kind), ViewEvent::ComponentRemoved { kind: removed, .. }) => {
                removed == kind
            }
            (Self::ComponentChanged(kind), ViewEvent::ComponentUpdated { component, .. }) => {
                component.kind == *kind
            }
            (Self::AuthorityChanged(kind), ViewEvent::AuthorityChanged { kind: changed, .. }) => {
                changed == kind
            }
            _ => false,
        }
    }
}

/// What changed in a sub view over one advance
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubViewDelta {
    /// Entities that became complete, sorted. Read their state from the store.
    pub entered: Vec<EntityId>,
    /// Entities that stopped being complete, sorted
    pub left: Vec<EntityId>,
    /// Events of entities that stayed complete throughout, in order
    pub events: Vec<ViewEvent>,
}

impl SubViewDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty() && self.events.is_empty()
    }
}

/// A filtered view over the entities carrying a tag component.
///
/// An entity is complete while it is in the view, carries the tag and passes
/// the filter. Only complete entities are reported. The filter is checked
/// again when the tag changes, when one of the refresh triggers fires for the
/// entity, or on an explicit refresh. An entity that leaves and comes back
/// within one advance is reported as both left and entered.
pub struct SubView {
    tag: ComponentKind,
    filter: SubViewFilter,
    triggers: Vec<RefreshTrigger>,
    tagged: BTreeSet<EntityId>,
    complete: BTreeSet<EntityId>,
    // complete set as of the last delta
    reported: BTreeSet<EntityId>,
    delta: SubViewDelta,
}

impl SubView {
    pub fn new(
        tag: ComponentKind,
        filter: impl Fn(EntityId, &ViewContext<'_>) -> bool + Send + 'static,
        triggers: Vec<RefreshTrigger>,
    ) -> Self {
        Self {
            tag,
            filter: Box::new(filter),
            triggers,
            tagged: BTreeSet::new(),
            complete: BTreeSet::new(),
            reported: BTreeSet::new(),
            delta: SubViewDelta::default(),
        }
    }

    /// Every tagged entity is complete
    pub fn unfiltered(tag: ComponentKind) -> Self {
        Self::new(tag, |_, _| true, Vec::new())
    }

    pub fn tag(&self) -> ComponentKind {
        self.tag
    }

    /// Picks up every tagged entity already in the view. Entities found here
    /// are reported as entered by the next advance.
    pub fn seed(&mut self, context: &ViewContext<'_>) {
        for entity in context.store().entities() {
            if context.has_component(&entity, &self.tag) {
                self.tagged.insert(entity);
                self.check(entity, context);
            }
        }
    }

    pub fn complete_entities(&self) -> &BTreeSet<EntityId> {
        &self.complete
    }

    pub fn is_complete(&self, entity: &EntityId) -> bool {
        self.complete.contains(entity)
    }

    pub fn is_tagged(&self, entity: &EntityId) -> bool {
        self.tagged.contains(entity)
    }

    /// Changes reported by the last advance
    pub fn delta(&self) -> &SubViewDelta {
        &self.delta
    }

    /// Checks every tagged entity against the filter again. Changes are
    /// reported by the next advance.
    pub fn refresh(&mut self, context: &ViewContext<'_>) {
        let tagged: Vec<EntityId> = self.tagged.iter().copied().collect();
        for entity in tagged {
            self.check(entity, context);
        }
    }

    pub fn refresh_entity(&mut self, entity: EntityId, context: &ViewContext<'_>) {
        if self.tagged.contains(&entity) {
            self.check(entity, context);
        }
    }

    /// Applies one tick's events, already reflected in `context`, and
    /// replaces the delta
    pub fn advance(&mut self, events: &[ViewEvent], context: &ViewContext<'_>) {
        let mut touched = BTreeSet::new();
        let mut removed = BTreeSet::new();
        for event in events {
            let Some(entity) = event.entity() else {
                continue;
            };
            match event {
                ViewEvent::EntityAdded { components, .. } => {
                    if components.iter().any(|component| component.kind == self.tag) {
                        self.tagged.insert(entity);
                    }
                    touched.insert(entity);
                }
                ViewEvent::ComponentAdded { component, .. } if component.kind == self.tag => {
                    self.tagged.insert(entity);
                    touched.insert(entity);
                }
                ViewEvent::ComponentRemoved { kind, .. } if *kind == self.tag => {
                    self.tagged.remove(&entity);
                    touched.insert(entity);
                }
                ViewEvent::EntityRemoved { .. } => {
                    self.tagged.remove(&entity);
                    removed.insert(entity);
                    touched.insert(entity);
                }
                event => {
                    if self.triggers.iter().any(|trigger| trigger.matches(event)) {
                        touched.insert(entity);
                    }
                }
            }
        }
        for entity in touched {
            self.check(entity, context);
        }

        // removed and added back within this advance
        let rejoined: BTreeSet<EntityId> = removed
            .into_iter()
            .filter(|entity| self.reported.contains(entity) && self.complete.contains(entity))
            .collect();
        let entered = self
            .complete
            .difference(&self.reported)
            .chain(rejoined.iter())
            .copied()
            .collect::<BTreeSet<_>>();
        let left = self
            .reported
            .difference(&self.complete)
            .chain(rejoined.iter())
            .copied()
            .collect::<BTreeSet<_>>();
        let events = events
            .iter()
            .filter(|event| match event.entity() {
                Some(entity) => {
                    self.reported.contains(&entity)
                        && self.complete.contains(&entity)
                        && !rejoined.contains(&entity)
                }
                None => false,
            })
            .cloned()
            .collect();

        self.delta = SubViewDelta {
            entered: entered.into_iter().collect(),
            left: left.into_iter().collect(),
            events,
        };
        self.reported = self.complete.clone();
    }

    fn check(&mut self, entity: EntityId, context: &ViewContext<'_>) {
        let complete = self.tagged.contains(&entity)
            && context.store().contains(&entity)
            && (self.filter)(entity, context);
        let changed = if complete {
            self.complete.insert(entity)
        } else {
            self.complete.remove(&entity)
        };
        if changed {
            debug!(
                "{} is {} in the {} sub view",
                entity,
                if complete { "complete" } else { "incomplete" },
                self.tag
            );
        }
    }
}
