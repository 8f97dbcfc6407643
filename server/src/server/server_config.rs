use std::{default::Default, time::Duration};

use mosaic_shared::RpcConfig;

use crate::interest::InterestConfig;

/// Contains Config properties which will be used by the Coordinator
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Retry policy, also used to size the drain window of deleted entities
    pub rpc: RpcConfig,
    /// Used to configure interest evaluation
    pub interest: InterestConfig,
    /// How long a worker's entity id reservation stays claimable
    pub reservation_ttl: Duration,
    /// Whether inbound packets of different workers are processed in parallel
    pub parallel_inbound: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            interest: InterestConfig::default(),
            reservation_ttl: Duration::from_secs(60),
            parallel_inbound: true,
        }
    }
}
