//! ## `EntityChannel` – per-entity staging gate
//!
//! Owns the visibility state of a *single entity* in a worker's view and the
//! buffer that keeps a half-replicated entity away from the application.
//!
//! ---
//! ### 1 · What problem does it solve?
//! The coordinator replicates an entity as a burst of ops: `AddEntity`, one
//! `AddComponent` per component, maybe an `AuthorityChange`, and finally
//! `InitialStateComplete`. Observers must never see the entity in between.
//!
//! ---
//! ### 2 · State machine
//!
//! ```text
//!            AddEntity                 InitialStateComplete
//!   (none) ────────────▶ Staging ─────────────────────────▶ Live
//!     ▲                     │                                 │
//!     │    RemoveEntity     │          RemoveEntity           │
//!     └─────────────────────┴─────────────────────────────────┘
//! ```
//!
//! * **`Staging`** – component adds, updates, removals and authority changes
//!   are folded into the buffer. A removal before commit discards everything.
//! * **`Live`** – the component store is the source of truth, the channel
//!   only remembers that the entity is visible.
//!
//! ---
//! ### 3 · Key invariants
//! * **Commit barrier** – nothing about a staged entity reaches the store or
//!   the application before `InitialStateComplete`.
//! * **Arrival order** – buffered authority changes are replayed in the order
//!   they arrived, after the components they were sent with.

use std::collections::BTreeMap;

use crate::{AuthoritySequence, ComponentData, ComponentKind, ComponentSetId};

/// Authority change received while the entity was staging
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StagedAuthority {
    pub set: ComponentSetId,
    pub authoritative: bool,
    pub sequence: AuthoritySequence,
}

#[derive(Debug, Default)]
pub struct StagedEntity {
    components: BTreeMap<ComponentKind, ComponentData>,
    authority: Vec<StagedAuthority>,
    buffered_ops: usize,
}

impl StagedEntity {
    /// An add over a staged component replaces it
    pub fn add_component(&mut self, component: ComponentData) {
        self.buffered_ops += 1;
        self.components.insert(component.kind, component);
    }

    /// Keeps whichever version is newer
    pub fn update_component(&mut self, component: ComponentData) {
        self.buffered_ops += 1;
        match self.components.get_mut(&component.kind) {
            Some(existing) if existing.version >= component.version => {}
            Some(existing) => *existing = component,
            None => {
                self.components.insert(component.kind, component);
            }
        }
    }

    pub fn remove_component(&mut self, kind: &ComponentKind) {
        self.buffered_ops += 1;
        self.components.remove(kind);
    }

    pub fn push_authority(&mut self, authority: StagedAuthority) {
        self.buffered_ops += 1;
        self.authority.push(authority);
    }

    pub fn buffered_ops(&self) -> usize {
        self.buffered_ops
    }

    pub fn into_parts(self) -> (Vec<ComponentData>, Vec<StagedAuthority>) {
        (self.components.into_values().collect(), self.authority)
    }
}

#[derive(Debug)]
pub enum EntityChannel {
    Staging(StagedEntity),
    Live,
}

impl EntityChannel {
    pub fn staging() -> Self {
        Self::Staging(StagedEntity::default())
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}
