//! Component kinds and sets shared by the integration tests

use mosaic_server::{InterestConfig, ServerConfig};
use mosaic_shared::{
    CommandId, ComponentData, ComponentKind, ComponentSetId, ComponentSettings, Position,
    Protocol,
};

pub const POSITION: ComponentKind = ComponentKind::new(1);
pub const VELOCITY: ComponentKind = ComponentKind::new(2);
pub const HEALTH: ComponentKind = ComponentKind::new(3);
pub const INVENTORY: ComponentKind = ComponentKind::new(4);

/// Position and velocity always change hands together
pub const PHYSICS: ComponentSetId = ComponentSetId::new(1);
pub const ITEMS: ComponentSetId = ComponentSetId::new(2);

pub const PING: CommandId = CommandId::new(1);
pub const DAMAGE: CommandId = CommandId::new(2);

pub fn protocol() -> Protocol {
    Protocol::builder()
        .add_component(POSITION, ComponentSettings::delegable())
        .add_component(VELOCITY, ComponentSettings::delegable().unreliable())
        .add_component(HEALTH, ComponentSettings::coordinator_owned())
        .add_component(INVENTORY, ComponentSettings::delegable())
        .add_component_set(PHYSICS, &[POSITION, VELOCITY])
        .add_component_set(ITEMS, &[INVENTORY])
        .build()
}

/// Coordinator config indexing `POSITION`, inbound handled in parallel
pub fn server_config() -> ServerConfig {
    ServerConfig {
        interest: InterestConfig {
            cell_size: 32.0,
            position_kind: Some(POSITION),
        },
        ..Default::default()
    }
}

pub fn position(x: f32, y: f32) -> ComponentData {
    ComponentData::new(POSITION, 1, Position::new(x, y, 0.0).to_bytes())
}

pub fn health(value: u8) -> ComponentData {
    ComponentData::new(HEALTH, 1, vec![value])
}

pub fn inventory(items: &[u8]) -> ComponentData {
    ComponentData::new(INVENTORY, 1, items.to_vec())
}
