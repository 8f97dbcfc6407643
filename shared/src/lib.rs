//! # Mosaic Shared
//! Entity view synchronization core shared between mosaic-server & mosaic-client:
//! component store, authority records, view deltas, RPC routing and wire ops.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod connection;
mod error;
mod messages;
mod protocol;
mod types;
mod world;

pub mod transport;

pub use connection::{
    DecodedBatch, Decoder, DecoderError, Encoder, EncoderError, MAX_PACKET_BYTES,
};
pub use error::SyncError;
pub use messages::{
    ops::{DownstreamOp, UpstreamOp},
    rpc::{
        OrderedIds, ReliabilityTier, RpcConfig, RpcEnvelope, RpcError, RpcReceived, RpcReceiver,
        RpcSender,
    },
};
pub use protocol::{ComponentSettings, Protocol, ProtocolError};
pub use types::{
    AuthoritySequence, CommandId, ComponentData, ComponentKind, ComponentSetId, EntityId,
    HostType, RpcSequence, Version, WorkerId,
};
pub use world::{
    delegation::{AuthorityError, AuthorityManager, AuthorityState, AuthorityTransition},
    interest::{Constraint, InterestQuery, Position},
    store::{ComponentStore, StoreDelta, StoreError, WriteOutcome},
    sync::{
        CallbackId, ComponentCallback, Dispatcher, EntityCallback, EntityChannel, RefreshTrigger,
        StagedAuthority, StagedEntity, SubView, SubViewDelta, SubViewFilter, ViewCallbacks,
        ViewContext, ViewDeltaComputer, ViewEvent,
    },
};
