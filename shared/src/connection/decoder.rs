use log::warn;
use serde::de::DeserializeOwned;

use super::error::DecoderError;

/// Largest packet accepted from a session
pub const MAX_PACKET_BYTES: usize = 16 * 1024 * 1024;

/// Ops recovered from one packet, plus the ops that had to be discarded
#[derive(Debug)]
pub struct DecodedBatch<T> {
    pub ops: Vec<T>,
    pub malformed: Vec<DecoderError>,
}

#[derive(Default)]
pub struct Decoder;

impl Decoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes a packet. A packet whose framing is unreadable is rejected as a
    /// whole; individual unreadable ops are reported in
    /// [`DecodedBatch::malformed`] and skipped.
    pub fn try_decode<T: DeserializeOwned>(
        &self,
        payload: &[u8],
    ) -> Result<DecodedBatch<T>, DecoderError> {
        if payload.len() > MAX_PACKET_BYTES {
            return Err(DecoderError::PayloadTooLarge {
                payload_size: payload.len(),
                limit: MAX_PACKET_BYTES,
            });
        }
        let frames: Vec<Vec<u8>> =
            bincode::deserialize(payload).map_err(|err| DecoderError::MalformedPacket {
                payload_size: payload.len(),
                reason: err.to_string(),
            })?;

        let mut ops = Vec::with_capacity(frames.len());
        let mut malformed = Vec::new();
        for (index, frame) in frames.iter().enumerate() {
            match bincode::deserialize::<T>(frame) {
                Ok(op) => ops.push(op),
                Err(err) => {
                    let error = DecoderError::MalformedOp {
                        index,
                        op_size: frame.len(),
                        reason: err.to_string(),
                    };
                    warn!("Discarding inbound op: {}", error);
                    malformed.push(error);
                }
            }
        }
        Ok(DecodedBatch { ops, malformed })
    }
}
