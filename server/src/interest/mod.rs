mod interest_config;
mod interest_manager;
mod spatial_grid;

pub use interest_config::InterestConfig;
pub use interest_manager::{FilterChange, InterestChanges, InterestManager, KindFilter};
pub use spatial_grid::{CellId, SpatialGrid};
