mod config;
mod envelope;
mod error;
mod ordered_ids;
mod rpc_receiver;
mod rpc_sender;

pub use config::RpcConfig;
pub use envelope::{ReliabilityTier, RpcEnvelope};
pub use error::RpcError;
pub use ordered_ids::OrderedIds;
pub use rpc_receiver::{RpcReceiver, RpcReceived};
pub use rpc_sender::RpcSender;
