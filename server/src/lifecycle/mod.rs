mod entity_allocator;
mod entity_lifecycle;
mod error;

pub use entity_allocator::{EntityAllocator, MAX_RESERVATION};
pub use entity_lifecycle::EntityLifecycle;
pub use error::LifecycleError;
