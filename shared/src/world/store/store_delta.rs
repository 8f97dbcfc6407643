use crate::{ComponentData, ComponentKind, EntityId};

/// Emitted by the component store for every successful write, in the order the
/// writes were applied to each entity
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreDelta {
    EntityAdded {
        entity: EntityId,
        components: Vec<ComponentData>,
    },
    ComponentAdded {
        entity: EntityId,
        component: ComponentData,
    },
    ComponentUpdated {
        entity: EntityId,
        component: ComponentData,
    },
    ComponentRemoved {
        entity: EntityId,
        kind: ComponentKind,
    },
    /// `tombstoned` is false when the entity only left this view
    EntityRemoved { entity: EntityId, tombstoned: bool },
}

impl StoreDelta {
    pub fn entity(&self) -> EntityId {
        match self {
            Self::EntityAdded { entity, .. }
            | Self::ComponentAdded { entity, .. }
            | Self::ComponentUpdated { entity, .. }
            | Self::ComponentRemoved { entity, .. }
            | Self::EntityRemoved { entity, .. } => *entity,
        }
    }

    /// Whether this delta changes which components an entity has (as opposed to
    /// only their state)
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::ComponentUpdated { .. })
    }
}
