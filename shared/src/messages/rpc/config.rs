use std::time::Duration;

/// Retry policy for reliable RPCs
#[derive(Clone, Debug)]
pub struct RpcConfig {
    /// How long to wait for an acknowledgement before retransmitting
    pub retry_interval: Duration,
    /// Retransmissions after the first send before the RPC times out
    pub max_retries: u32,
    /// Out-of-order envelopes buffered per receive stream before new ones are
    /// dropped (the sender retransmits them)
    pub max_buffered: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(200),
            max_retries: 5,
            max_buffered: 64,
        }
    }
}

impl RpcConfig {
    /// Upper bound on how long a reliable RPC can still be in flight after it
    /// was first sent
    pub fn drain_duration(&self) -> Duration {
        self.retry_interval * (self.max_retries + 1)
    }
}
