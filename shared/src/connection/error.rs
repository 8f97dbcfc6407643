use thiserror::Error;

/// Errors that can occur while encoding an outgoing op batch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncoderError {
    /// An op could not be serialized
    #[error("Failed to serialize op {index} of batch: {reason}")]
    OpSerializationFailed { index: usize, reason: String },

    /// The batch framing could not be serialized
    #[error("Failed to serialize batch of {op_count} ops: {reason}")]
    BatchSerializationFailed { op_count: usize, reason: String },
}

/// Errors that can occur while decoding an inbound op batch. Each one means
/// the affected message is discarded and the connection continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    /// Payload exceeds the accepted packet size (SECURITY: potentially malicious payload)
    #[error("Payload of {payload_size} bytes exceeds the {limit} byte packet limit")]
    PayloadTooLarge { payload_size: usize, limit: usize },

    /// Batch framing could not be parsed, the whole packet is discarded
    #[error("Malformed packet of {payload_size} bytes: {reason}")]
    MalformedPacket { payload_size: usize, reason: String },

    /// A single op could not be parsed, only that op is discarded
    #[error("Malformed op {index} ({op_size} bytes): {reason}")]
    MalformedOp {
        index: usize,
        op_size: usize,
        reason: String,
    },
}
