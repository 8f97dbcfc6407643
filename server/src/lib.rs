//! # Mosaic Server
//! The coordinating service: owns the authoritative view of every entity,
//! computes which entities each connected worker is interested in, arbitrates
//! authority handoff between workers and forwards RPCs to the worker holding
//! authority over their target.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

mod connection;
mod error;
mod events;
mod interest;
mod lifecycle;
mod server;

pub mod shared {
    pub use mosaic_shared::{
        transport, AuthorityError, ComponentData, ComponentKind, ComponentSetId,
        ComponentSettings, Constraint, EntityId, InterestQuery, Position, Protocol, RpcConfig,
        SyncError, WorkerId,
    };
}

pub use connection::{Connection, InboundBatch};
pub use error::CoordinatorError;
pub use events::CoordinatorEvents;
pub use interest::{
    CellId, FilterChange, InterestChanges, InterestConfig, InterestManager, KindFilter, SpatialGrid,
};
pub use lifecycle::{EntityAllocator, EntityLifecycle, LifecycleError, MAX_RESERVATION};
pub use server::{Coordinator, ServerConfig};
