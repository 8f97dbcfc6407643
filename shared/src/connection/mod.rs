pub mod decoder;
pub mod encoder;
pub mod error;

pub use decoder::{DecodedBatch, Decoder, MAX_PACKET_BYTES};
pub use encoder::Encoder;
pub use error::{DecoderError, EncoderError};
