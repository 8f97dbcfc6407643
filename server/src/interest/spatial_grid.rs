use std::collections::{HashMap, HashSet};

use mosaic_shared::{EntityId, Position};

pub type CellId = (i32, i32);

/// Uniform spatial hash over the x/y plane. Only entities with a known
/// position are indexed.
pub struct SpatialGrid {
    cell_size: f32,
    cells: HashMap<CellId, HashSet<EntityId>>,
    positions: HashMap<EntityId, (Position, CellId)>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            positions: HashMap::new(),
        }
    }

    /// Get cell from world coordinates
    pub fn cell_at(&self, world_x: f32, world_y: f32) -> CellId {
        let x = (world_x / self.cell_size).floor() as i32;
        let y = (world_y / self.cell_size).floor() as i32;
        (x, y)
    }

    /// Inserts or moves an entity. Returns true if its cell changed.
    pub fn update(&mut self, entity: EntityId, position: Position) -> bool {
        let cell = self.cell_at(position.x, position.y);
        let previous = self.positions.insert(entity, (position, cell));
        match previous {
            Some((_, old_cell)) if old_cell == cell => false,
            Some((_, old_cell)) => {
                self.unlink(&entity, &old_cell);
                self.cells.entry(cell).or_default().insert(entity);
                true
            }
            None => {
                self.cells.entry(cell).or_default().insert(entity);
                true
            }
        }
    }

    pub fn remove(&mut self, entity: &EntityId) -> bool {
        let Some((_, cell)) = self.positions.remove(entity) else {
            return false;
        };
        self.unlink(entity, &cell);
        true
    }

    fn unlink(&mut self, entity: &EntityId, cell: &CellId) {
        if let Some(members) = self.cells.get_mut(cell) {
            members.remove(entity);
            if members.is_empty() {
                self.cells.remove(cell);
            }
        }
    }

    pub fn position(&self, entity: &EntityId) -> Option<&Position> {
        self.positions.get(entity).map(|(position, _)| position)
    }

    /// Entities in every cell overlapping the x/y rectangle `min..=max`. A
    /// superset of the entities inside it, callers filter exactly.
    pub fn query(&self, min: &Position, max: &Position) -> Vec<EntityId> {
        let (min_x, min_y) = self.cell_at(min.x, min.y);
        let (max_x, max_y) = self.cell_at(max.x, max.y);

        let cell_count = (max_x as i64 - min_x as i64 + 1) * (max_y as i64 - min_y as i64 + 1);
        let mut found = Vec::new();
        if cell_count > self.cells.len() as i64 {
            // sparse grid, walking occupied cells is cheaper
            for ((x, y), members) in &self.cells {
                if (min_x..=max_x).contains(x) && (min_y..=max_y).contains(y) {
                    found.extend(members.iter().copied());
                }
            }
        } else {
            for x in min_x..=max_x {
                for y in min_y..=max_y {
                    if let Some(members) = self.cells.get(&(x, y)) {
                        found.extend(members.iter().copied());
                    }
                }
            }
        }
        found.sort();
        found
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
