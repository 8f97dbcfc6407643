use std::collections::HashMap;

use log::{debug, trace, warn};

use super::{OrderedIds, RpcEnvelope};
use crate::{ComponentKind, EntityId, RpcSequence, WorkerId};

type StreamKey = (EntityId, ComponentKind, WorkerId);

struct ReceiveStream {
    last_processed: RpcSequence,
    buffered: OrderedIds<RpcEnvelope>,
}

impl ReceiveStream {
    fn new() -> Self {
        Self {
            last_processed: 0,
            buffered: OrderedIds::new(),
        }
    }
}

/// What the application should see after an envelope arrives
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RpcReceived {
    /// Envelopes released to the application, in send order
    pub deliver: Vec<RpcEnvelope>,
    /// Cumulative acknowledgement to return to the sender, if any
    pub ack: Option<RpcSequence>,
}

/// Incoming half of the RPC router.
///
/// Tracks the highest processed sequence per (entity, component kind, sender)
/// and drops anything at or below it, so retransmissions are applied at most
/// once. Envelopes arriving ahead of a gap are buffered until the gap fills or
/// the sender's stream floor moves past it.
pub struct RpcReceiver {
    streams: HashMap<StreamKey, ReceiveStream>,
    max_buffered: usize,
}

impl RpcReceiver {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            streams: HashMap::new(),
            max_buffered,
        }
    }

    pub fn receive(&mut self, sender: WorkerId, envelope: RpcEnvelope) -> RpcReceived {
        if !envelope.is_reliable() {
            return RpcReceived {
                deliver: vec![envelope],
                ack: None,
            };
        }

        let key = (envelope.target, envelope.kind, sender);
        let stream = self.streams.entry(key).or_insert_with(ReceiveStream::new);
        let mut deliver = Vec::new();

        // everything below the floor was acked or abandoned by the sender
        if envelope.stream_floor > stream.last_processed + 1 {
            while let Some((sequence, _)) = stream.buffered.peek_front() {
                if *sequence >= envelope.stream_floor {
                    break;
                }
                if let Some((sequence, buffered)) = stream.buffered.pop_front() {
                    stream.last_processed = sequence;
                    deliver.push(buffered);
                }
            }
            if stream.last_processed + 1 < envelope.stream_floor {
                debug!(
                    "RPC stream {}/{} from {} skipping to floor {}",
                    envelope.target, envelope.kind, sender, envelope.stream_floor
                );
                stream.last_processed = envelope.stream_floor - 1;
            }
        }

        if envelope.sequence <= stream.last_processed {
            trace!(
                "Dropping duplicate RPC seq {} on {}/{} from {}",
                envelope.sequence,
                envelope.target,
                envelope.kind,
                sender
            );
        } else if envelope.sequence == stream.last_processed + 1 {
            stream.last_processed = envelope.sequence;
            deliver.push(envelope);
        } else if stream.buffered.len() >= self.max_buffered {
            warn!(
                "RPC stream {}/{} from {} buffer full, dropping seq {}",
                envelope.target, envelope.kind, sender, envelope.sequence
            );
        } else {
            let sequence = envelope.sequence;
            stream.buffered.push_back(sequence, envelope);
        }

        while let Some((sequence, _)) = stream.buffered.peek_front() {
            let sequence = *sequence;
            if sequence <= stream.last_processed {
                stream.buffered.pop_front();
                continue;
            }
            if sequence != stream.last_processed + 1 {
                break;
            }
            if let Some((_, buffered)) = stream.buffered.pop_front() {
                stream.last_processed = sequence;
                deliver.push(buffered);
            }
        }

        RpcReceived {
            deliver,
            ack: Some(stream.last_processed),
        }
    }

    pub fn last_processed(
        &self,
        target: EntityId,
        kind: ComponentKind,
        sender: WorkerId,
    ) -> Option<RpcSequence> {
        self.streams
            .get(&(target, kind, sender))
            .map(|stream| stream.last_processed)
    }

    /// Streams currently tracked for duplicates
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Forgets duplicate tracking for a sender whose connection is gone
    pub fn drop_sender(&mut self, sender: WorkerId) {
        self.streams.retain(|(_, _, stream_sender), _| *stream_sender != sender);
    }

    pub fn drop_target(&mut self, entity: EntityId) {
        self.streams.retain(|(target, _, _), _| *target != entity);
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }
}
