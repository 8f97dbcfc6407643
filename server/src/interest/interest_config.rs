use mosaic_shared::ComponentKind;

/// Contains Config properties used to evaluate worker interest
#[derive(Clone, Debug)]
pub struct InterestConfig {
    /// Edge length of a spatial hash cell, in world units
    pub cell_size: f32,
    /// Component kind whose state holds an encoded `Position`. Without one,
    /// spatial constraints never match.
    pub position_kind: Option<ComponentKind>,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            cell_size: 64.0,
            position_kind: None,
        }
    }
}
