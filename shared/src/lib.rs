//! # Shared Protocol Library
//!
//! Wire-level types used by both the zone server and its clients.
//!
//! ## Modules
//!
//! - [`buffer`]: typed sequential read/write over a growable byte buffer
//! - [`packet`]: a buffer tagged with an opcode
//! - [`opcode`]: the opcode catalogue and dispatch table size
//! - [`frame`]: length-prefixed framing of the TCP stream
//! - [`movement`]: the position payload carried by movement packets
//!
//! ## Byte order
//!
//! The frame header (length and opcode) is big-endian. Payload scalars are
//! written in the host's native byte order and are not normalized, so
//! client and server must run on hosts of the same endianness.

use thiserror::Error;

pub mod buffer;
pub mod frame;
pub mod movement;
pub mod opcode;
pub mod packet;

pub use buffer::{ByteBuffer, ByteRead, ByteReader};
pub use frame::{encode_frame, split_body, FrameBuf, FrameParser, ParseState};
pub use movement::Position;
pub use opcode::{Opcode, OPCODE_COUNT};
pub use packet::Packet;

/// TCP port the server listens on unless configured otherwise
pub const DEFAULT_PORT: u16 = 40000;

/// Errors raised while encoding or decoding packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("tried to read {requested} bytes with only {remaining} remaining")]
    ReadOutOfRange { requested: usize, remaining: usize },

    #[error("decoded floating point value is NaN or infinite")]
    NonFinite,

    #[error("frame of {size} bytes exceeds the limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;
