//! Error types for the zone server

use shared::CodecError;
use std::io;
use thiserror::Error;

/// A frame that was reassembled but cannot be dispatched
///
/// These are recoverable: the frame is dropped and, under the default
/// policy, the connection keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed packet size {len}")]
    TooShort { len: usize },

    #[error("invalid opcode {opcode} (table size {table_size})")]
    OpcodeOutOfRange { opcode: u16, table_size: usize },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("a server instance is already running in this process")]
    AlreadyRunning,

    #[error("no zone available for a new session")]
    NoZoneAvailable,

    #[error("receive buffer pool exhausted ({capacity} blocks)")]
    ReceivePoolExhausted { capacity: usize },

    #[error("opcode {0} is outside the dispatch table")]
    UnknownOpcode(u16),
}

pub type Result<T> = std::result::Result<T, ServerError>;
