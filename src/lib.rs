// src/lib.rs
//
// Bit-level CAN 2.0 A/B frame codec.
//
// Decoding turns a text stream of bits into frames: destuffing, field
// extraction, CRC check and violation reporting, followed by a round-trip
// self-check. Encoding turns a logical message into the stuffed bit string
// that would appear on the bus.

#[macro_use]
pub mod logging;

pub mod bits;
pub mod config;
pub mod crc;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod glossary;
pub mod roundtrip;
pub mod stream;
pub mod stuffing;

pub use bits::{Bit, BitSource, FramePosition, SourceBit};
pub use config::{ByteOrder, CodecConfig};
pub use decoder::{
    DecodeOutcome, DecodedFrame, FrameDecoder, InternalFault, Severity, Stage, Violation,
    ViolationKind,
};
pub use encoder::{EncodedFrame, FrameEncoder, Presentation};
pub use error::{CodecError, CodecResult};
pub use frame::{FrameFields, LogicalMessage};
pub use stream::{decode_stream, FrameReport, StreamDecoder};

/// Encode `msg` with the given configuration.
pub fn encode_message(msg: &LogicalMessage, config: &CodecConfig) -> CodecResult<EncodedFrame> {
    FrameEncoder::new(config).encode(msg)
}
