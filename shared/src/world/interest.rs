use serde::{Deserialize, Serialize};

use crate::{ComponentKind, EntityId};

/// World-space position, read from the configured position component.
/// Encoded as three little-endian `f32`s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ENCODED_LEN: usize = 12;

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::ENCODED_LEN);
        bytes.extend_from_slice(&self.x.to_le_bytes());
        bytes.extend_from_slice(&self.y.to_le_bytes());
        bytes.extend_from_slice(&self.z.to_le_bytes());
        bytes
    }

    /// Returns `None` if the blob is not exactly one encoded position
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let read = |offset: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&bytes[offset..offset + 4]);
            f32::from_le_bytes(raw)
        };
        Some(Self::new(read(0), read(4), read(8)))
    }

    pub fn distance_squared(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Predicate selecting the entities a query matches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    Sphere { center: Position, radius: f32 },
    Box { center: Position, half_extents: Position },
    /// Entities that currently have a component of this kind
    Component(ComponentKind),
    Entities(Vec<EntityId>),
    And(Vec<Constraint>),
    Or(Vec<Constraint>),
}

impl Constraint {
    /// Whether matching this constraint depends on entity position
    pub fn is_spatial(&self) -> bool {
        match self {
            Self::Sphere { .. } | Self::Box { .. } => true,
            Self::Component(_) | Self::Entities(_) => false,
            Self::And(inner) | Self::Or(inner) => inner.iter().any(Constraint::is_spatial),
        }
    }

    /// Evaluates the constraint against a single entity
    pub fn matches(
        &self,
        entity: &EntityId,
        position: Option<&Position>,
        has_kind: &dyn Fn(&ComponentKind) -> bool,
    ) -> bool {
        match self {
            Self::Sphere { center, radius } => position
                .map(|position| position.distance_squared(center) <= radius * radius)
                .unwrap_or(false),
            Self::Box {
                center,
                half_extents,
            } => position
                .map(|position| {
                    (position.x - center.x).abs() <= half_extents.x
                        && (position.y - center.y).abs() <= half_extents.y
                        && (position.z - center.z).abs() <= half_extents.z
                })
                .unwrap_or(false),
            Self::Component(kind) => has_kind(kind),
            Self::Entities(entities) => entities.contains(entity),
            Self::And(inner) => inner
                .iter()
                .all(|constraint| constraint.matches(entity, position, has_kind)),
            Self::Or(inner) => inner
                .iter()
                .any(|constraint| constraint.matches(entity, position, has_kind)),
        }
    }

    /// Axis-aligned bounds `(min, max)` on the x/y plane that contain every
    /// position this constraint can match, or `None` if unbounded
    pub fn spatial_bounds(&self) -> Option<(Position, Position)> {
        match self {
            Self::Sphere { center, radius } => Some((
                Position::new(center.x - radius, center.y - radius, center.z - radius),
                Position::new(center.x + radius, center.y + radius, center.z + radius),
            )),
            Self::Box {
                center,
                half_extents,
            } => Some((
                Position::new(
                    center.x - half_extents.x,
                    center.y - half_extents.y,
                    center.z - half_extents.z,
                ),
                Position::new(
                    center.x + half_extents.x,
                    center.y + half_extents.y,
                    center.z + half_extents.z,
                ),
            )),
            Self::Component(_) | Self::Entities(_) => None,
            // an intersection is bounded if any operand is
            Self::And(inner) => inner.iter().find_map(Constraint::spatial_bounds),
            Self::Or(inner) => {
                let mut bounds: Option<(Position, Position)> = None;
                for constraint in inner {
                    let (min, max) = constraint.spatial_bounds()?;
                    bounds = Some(match bounds {
                        None => (min, max),
                        Some((lo, hi)) => (
                            Position::new(lo.x.min(min.x), lo.y.min(min.y), lo.z.min(min.z)),
                            Position::new(hi.x.max(max.x), hi.y.max(max.y), hi.z.max(max.z)),
                        ),
                    });
                }
                bounds
            }
        }
    }
}

/// A worker's interest query. `result_kinds` limits which components the
/// worker receives for matching entities, `None` meaning all of them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterestQuery {
    pub constraint: Constraint,
    pub result_kinds: Option<Vec<ComponentKind>>,
}

impl InterestQuery {
    pub fn new(constraint: Constraint) -> Self {
        Self {
            constraint,
            result_kinds: None,
        }
    }

    pub fn with_result_kinds(mut self, kinds: Vec<ComponentKind>) -> Self {
        self.result_kinds = Some(kinds);
        self
    }
}
