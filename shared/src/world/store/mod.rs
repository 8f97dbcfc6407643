mod component_store;
mod error;
mod store_delta;

pub use component_store::{ComponentStore, WriteOutcome};
pub use error::StoreError;
pub use store_delta::StoreDelta;
