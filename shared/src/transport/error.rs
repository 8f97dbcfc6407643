use thiserror::Error;

/// The session could not accept an outgoing packet
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Session is closed, the packet was not sent
    #[error("Connection session closed, cannot send {payload_size} byte packet")]
    Closed { payload_size: usize },
}

/// The session failed while polling for inbound packets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    /// Session is closed and fully drained
    #[error("Connection session closed")]
    Closed,
}
