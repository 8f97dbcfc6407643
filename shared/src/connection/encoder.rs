use serde::Serialize;

use super::error::EncoderError;

/// Serializes op batches into single packets. Each op is framed separately so
/// the receiver can discard a malformed op without losing its neighbours.
#[derive(Default)]
pub struct Encoder {
    result: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { result: Vec::new() }
    }

    /// Try to encode a batch, returning the packet bytes
    pub fn try_encode<T: Serialize>(&mut self, ops: &[T]) -> Result<&[u8], EncoderError> {
        let mut frames = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            let frame = bincode::serialize(op).map_err(|err| EncoderError::OpSerializationFailed {
                index,
                reason: err.to_string(),
            })?;
            frames.push(frame);
        }
        self.result = bincode::serialize(&frames).map_err(|err| {
            EncoderError::BatchSerializationFailed {
                op_count: ops.len(),
                reason: err.to_string(),
            }
        })?;
        Ok(&self.result)
    }

    /// Encode a batch
    ///
    /// # Panics
    /// Panics if an op cannot be serialized
    pub fn encode<T: Serialize>(&mut self, ops: &[T]) -> &[u8] {
        if let Err(err) = self.try_encode(ops) {
            panic!("{}", err);
        }
        &self.result
    }
}
