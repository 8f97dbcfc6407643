use std::default::Default;

use mosaic_shared::RpcConfig;

/// Sizing of the worker's pool of reserved entity ids
#[derive(Clone, Debug)]
pub struct EntityPoolConfig {
    /// Ids requested as soon as the worker is welcomed
    pub initial_reservation: u32,
    /// A refresh is requested once fewer ids than this remain
    pub refresh_threshold: u32,
    /// Ids requested per refresh
    pub refresh_count: u32,
}

impl Default for EntityPoolConfig {
    fn default() -> Self {
        Self {
            initial_reservation: 64,
            refresh_threshold: 16,
            refresh_count: 64,
        }
    }
}

/// Contains Config properties which will be used by a Worker
#[derive(Clone, Debug, Default)]
pub struct WorkerConfig {
    /// Retry policy for reliable RPCs sent by this worker
    pub rpc: RpcConfig,
    /// Used to configure the reserved entity id pool
    pub pool: EntityPoolConfig,
}
