//! # Mosaic Client
//! The worker side of mosaic: keeps a local view of the entities in this
//! worker's interest in sync with the coordinator, gates local writes on
//! authority and routes reliable RPCs.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

mod client_config;
mod entity_pool;
mod error;
mod worker_client;
mod write_buffer;

pub mod shared {
    pub use mosaic_shared::{
        transport, CallbackId, CommandId, ComponentData, ComponentKind, ComponentSetId,
        ComponentSettings, Constraint, Dispatcher, EntityId, InterestQuery, Position, Protocol,
        RefreshTrigger, ReliabilityTier, RpcConfig, RpcError, SubView, SubViewDelta,
        ViewCallbacks, ViewContext, ViewEvent, WorkerId,
    };
}

pub use client_config::{EntityPoolConfig, WorkerConfig};
pub use entity_pool::EntityPool;
pub use error::WorkerError;
pub use worker_client::{SubViewId, WorkerClient};
pub use write_buffer::{PendingWrite, WriteBuffer};
