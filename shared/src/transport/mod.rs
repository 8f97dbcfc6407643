mod error;
mod memory;

pub use error::{RecvError, SendError};
pub use memory::{LinkConditionerConfig, MemorySession};

/// Invoked once when a session observes that it is closed
pub type DisconnectCallback = Box<dyn FnOnce() + Send>;

/// Reliable, ordered, framed packet channel between a worker and the
/// coordinator. Framing is the session's concern, one `send` arrives as one
/// packet from `receive`.
pub trait ConnectionSession: Send {
    fn send(&self, payload: &[u8]) -> Result<(), SendError>;

    /// Polls the next inbound packet. `Ok(None)` means nothing is waiting yet,
    /// `Err(RecvError::Closed)` means nothing ever will.
    fn receive(&mut self) -> Result<Option<Vec<u8>>, RecvError>;

    /// Registers a callback run when the session closes, from either side
    fn on_disconnect(&mut self, callback: DisconnectCallback);

    fn is_connected(&self) -> bool;

    /// Closes the session locally
    fn close(&mut self);
}
