pub mod ops;
pub mod rpc;
