use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    time::Instant,
};

use log::{debug, warn};

use super::{ReliabilityTier, RpcConfig, RpcEnvelope, RpcError};
use crate::{CommandId, ComponentKind, EntityId, RpcSequence};

struct PendingRpc {
    envelope: RpcEnvelope,
    last_sent: Instant,
    retries: u32,
}

struct SendStream {
    next_sequence: RpcSequence,
    // ordered so the floor is the first key
    pending: BTreeMap<RpcSequence, PendingRpc>,
}

impl SendStream {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            pending: BTreeMap::new(),
        }
    }

    fn floor(&self) -> RpcSequence {
        self.pending
            .keys()
            .next()
            .copied()
            .unwrap_or(self.next_sequence)
    }
}

/// Outgoing half of the RPC router.
///
/// Reliable envelopes are numbered per (entity, component kind) stream and kept
/// until a cumulative acknowledgement covers them. Retry timers are plain
/// deadlines polled by [`RpcSender::collect_outgoing`], so cancelling one is
/// just removing the pending entry.
pub struct RpcSender {
    config: RpcConfig,
    streams: HashMap<(EntityId, ComponentKind), SendStream>,
    outgoing: VecDeque<RpcEnvelope>,
    failures: Vec<RpcError>,
}

impl RpcSender {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config,
            streams: HashMap::new(),
            outgoing: VecDeque::new(),
            failures: Vec::new(),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Queues an RPC for sending. Returns the assigned sequence, zero for
    /// unreliable calls.
    pub fn call(
        &mut self,
        now: Instant,
        target: EntityId,
        kind: ComponentKind,
        command: CommandId,
        payload: Vec<u8>,
        tier: ReliabilityTier,
    ) -> RpcSequence {
        if tier == ReliabilityTier::Unreliable {
            self.outgoing.push_back(RpcEnvelope {
                target,
                kind,
                command,
                payload,
                tier,
                sequence: 0,
                stream_floor: 0,
            });
            return 0;
        }

        let stream = self
            .streams
            .entry((target, kind))
            .or_insert_with(SendStream::new);
        let sequence = stream.next_sequence;
        stream.next_sequence += 1;
        let envelope = RpcEnvelope {
            target,
            kind,
            command,
            payload,
            tier,
            sequence,
            stream_floor: 0,
        };
        stream.pending.insert(
            sequence,
            PendingRpc {
                envelope: envelope.clone(),
                last_sent: now,
                retries: 0,
            },
        );
        let stream_floor = stream.floor();
        self.outgoing.push_back(RpcEnvelope {
            stream_floor,
            ..envelope
        });
        sequence
    }

    /// Cumulative acknowledgement: every pending envelope of the stream up to
    /// and including `sequence` is done. Returns how many were removed.
    pub fn ack(&mut self, target: EntityId, kind: ComponentKind, sequence: RpcSequence) -> usize {
        let Some(stream) = self.streams.get_mut(&(target, kind)) else {
            return 0;
        };
        let still_pending = stream.pending.split_off(&sequence.saturating_add(1));
        let acked = std::mem::replace(&mut stream.pending, still_pending).len();
        if acked > 0 {
            debug!("RPC stream {}/{} acked through seq {}", target, kind, sequence);
        }
        acked
    }

    /// Drains queued envelopes and retransmits every reliable envelope whose
    /// retry deadline passed. Envelopes over the retry budget are dropped and
    /// reported through [`RpcSender::take_failures`].
    pub fn collect_outgoing(&mut self, now: Instant) -> Vec<RpcEnvelope> {
        let mut outgoing: Vec<RpcEnvelope> = self.outgoing.drain(..).collect();

        let retry_interval = self.config.retry_interval;
        let max_retries = self.config.max_retries;
        for ((target, kind), stream) in self.streams.iter_mut() {
            let mut expired = Vec::new();
            let mut retried = Vec::new();
            for (sequence, pending) in stream.pending.iter_mut() {
                if now.saturating_duration_since(pending.last_sent) < retry_interval {
                    continue;
                }
                if pending.retries >= max_retries {
                    expired.push(*sequence);
                    continue;
                }
                pending.retries += 1;
                pending.last_sent = now;
                retried.push(*sequence);
            }
            for sequence in expired {
                if let Some(pending) = stream.pending.remove(&sequence) {
                    warn!(
                        "RPC {} (seq {}) to {}/{} timed out",
                        pending.envelope.command, sequence, target, kind
                    );
                    self.failures.push(RpcError::Timeout {
                        target: *target,
                        kind: *kind,
                        command: pending.envelope.command,
                        sequence,
                        attempts: pending.retries + 1,
                    });
                }
            }
            let stream_floor = stream.floor();
            for sequence in retried {
                if let Some(pending) = stream.pending.get(&sequence) {
                    outgoing.push(RpcEnvelope {
                        stream_floor,
                        ..pending.envelope.clone()
                    });
                }
            }
        }
        outgoing
    }

    pub fn take_failures(&mut self) -> Vec<RpcError> {
        std::mem::take(&mut self.failures)
    }

    /// Forgets every stream targeting `entity`, reporting outstanding reliable
    /// envelopes as cancelled
    pub fn drop_target(&mut self, entity: EntityId) {
        let keys: Vec<(EntityId, ComponentKind)> = self
            .streams
            .keys()
            .filter(|(target, _)| *target == entity)
            .copied()
            .collect();
        for key in keys {
            if let Some(stream) = self.streams.remove(&key) {
                self.cancel_stream(stream);
            }
        }
        self.outgoing.retain(|envelope| envelope.target != entity);
    }

    /// Cancels every pending timer. Used on connection teardown, the returned
    /// errors list what was still outstanding.
    pub fn clear(&mut self) -> Vec<RpcError> {
        for (_, stream) in std::mem::take(&mut self.streams) {
            self.cancel_stream(stream);
        }
        self.outgoing.clear();
        self.take_failures()
    }

    fn cancel_stream(&mut self, stream: SendStream) {
        for (sequence, pending) in stream.pending {
            self.failures.push(RpcError::Cancelled {
                target: pending.envelope.target,
                kind: pending.envelope.kind,
                command: pending.envelope.command,
                sequence,
            });
        }
    }

    /// Reliable envelopes awaiting acknowledgement
    pub fn pending_count(&self) -> usize {
        self.streams.values().map(|stream| stream.pending.len()).sum()
    }
}
