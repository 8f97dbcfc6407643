use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::debug;
use parking_lot::Mutex;

use super::{ConnectionSession, DisconnectCallback, RecvError, SendError};

/// Deterministic misbehaviour injected on send, for exercising retransmission
/// and duplicate suppression
#[derive(Clone, Debug)]
pub struct LinkConditionerConfig {
    pub duplicate_probability: f32,
    pub reorder_probability: f32,
    pub seed: u64,
}

impl LinkConditionerConfig {
    pub fn new(duplicate_probability: f32, reorder_probability: f32, seed: u64) -> Self {
        Self {
            duplicate_probability,
            reorder_probability,
            seed,
        }
    }
}

struct LinkConditioner {
    config: LinkConditionerConfig,
    rng: fastrand::Rng,
    // packet held back to be delivered after the next one
    held: Option<Vec<u8>>,
}

impl LinkConditioner {
    fn new(config: LinkConditionerConfig) -> Self {
        let rng = fastrand::Rng::with_seed(config.seed);
        Self {
            config,
            rng,
            held: None,
        }
    }

    fn condition(&mut self, payload: &[u8]) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        if self.held.is_none() && self.rng.f32() < self.config.reorder_probability {
            self.held = Some(payload.to_vec());
            return packets;
        }
        packets.push(payload.to_vec());
        if self.rng.f32() < self.config.duplicate_probability {
            packets.push(payload.to_vec());
        }
        if let Some(held) = self.held.take() {
            packets.push(held);
        }
        packets
    }
}

/// In-memory [`ConnectionSession`] backed by a pair of unbounded channels
pub struct MemorySession {
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    closed: Arc<AtomicBool>,
    callbacks: Vec<DisconnectCallback>,
    conditioner: Option<Mutex<LinkConditioner>>,
}

impl MemorySession {
    /// Two connected ends, one for each side
    pub fn pair() -> (Self, Self) {
        let (a_to_b, b_from_a) = unbounded();
        let (b_to_a, a_from_b) = unbounded();
        let closed = Arc::new(AtomicBool::new(false));
        (
            Self::new(a_to_b, a_from_b, closed.clone()),
            Self::new(b_to_a, b_from_a, closed),
        )
    }

    fn new(sender: Sender<Vec<u8>>, receiver: Receiver<Vec<u8>>, closed: Arc<AtomicBool>) -> Self {
        Self {
            sender,
            receiver,
            closed,
            callbacks: Vec::new(),
            conditioner: None,
        }
    }

    /// Duplicates and reorders packets sent from this end
    pub fn with_conditioner(mut self, config: LinkConditionerConfig) -> Self {
        self.conditioner = Some(Mutex::new(LinkConditioner::new(config)));
        self
    }

    /// Sends a packet held back by the conditioner, if any
    pub fn flush_held(&self) -> Result<(), SendError> {
        let Some(conditioner) = &self.conditioner else {
            return Ok(());
        };
        let held = conditioner.lock().held.take();
        if let Some(packet) = held {
            self.push(packet)?;
        }
        Ok(())
    }

    fn push(&self, packet: Vec<u8>) -> Result<(), SendError> {
        let payload_size = packet.len();
        self.sender
            .send(packet)
            .map_err(|_| SendError::Closed { payload_size })
    }

    fn fire_callbacks(&mut self) {
        for callback in self.callbacks.drain(..) {
            callback();
        }
    }
}

impl ConnectionSession for MemorySession {
    fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed {
                payload_size: payload.len(),
            });
        }
        let packets = match &self.conditioner {
            Some(conditioner) => conditioner.lock().condition(payload),
            None => vec![payload.to_vec()],
        };
        for packet in packets {
            self.push(packet)?;
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<Vec<u8>>, RecvError> {
        match self.receiver.try_recv() {
            Ok(packet) => Ok(Some(packet)),
            Err(TryRecvError::Empty) => {
                if self.closed.load(Ordering::Acquire) {
                    self.fire_callbacks();
                    return Err(RecvError::Closed);
                }
                Ok(None)
            }
            Err(TryRecvError::Disconnected) => {
                self.closed.store(true, Ordering::Release);
                self.fire_callbacks();
                Err(RecvError::Closed)
            }
        }
    }

    fn on_disconnect(&mut self, callback: DisconnectCallback) {
        if self.closed.load(Ordering::Acquire) {
            callback();
            return;
        }
        self.callbacks.push(callback);
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Memory session closed locally");
        }
        self.fire_callbacks();
    }
}
