//! Length-prefixed framing for the TCP byte stream
//!
//! ```text
//! [2 bytes: body length, big-endian] [2 bytes: opcode, big-endian] [N bytes: payload, native order]
//! ```
//!
//! `body length` counts the opcode plus the payload. A valid body has at
//! least [`MIN_BODY_LEN`] bytes; the parser itself does not enforce that,
//! it only reassembles bodies and leaves validation to the receiver.

use smallvec::SmallVec;

use crate::packet::Packet;
use crate::{CodecError, Result};

/// Bytes used by the length prefix
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Bytes used by the opcode at the start of each body
pub const OPCODE_SIZE: usize = 2;

/// Opcode plus at least one payload byte
pub const MIN_BODY_LEN: usize = OPCODE_SIZE + 1;

/// Hard ceiling on the encoded size of a single frame
pub const MAX_FRAME_SIZE: usize = 100 * 1024;

/// Frames up to this size are encoded without touching the heap
pub const INLINE_FRAME_CAPACITY: usize = 256;

/// Encoded frame, inline for small packets and heap-backed above
/// [`INLINE_FRAME_CAPACITY`]
pub type FrameBuf = SmallVec<[u8; INLINE_FRAME_CAPACITY]>;

/// Where the parser is inside the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    /// Waiting for the first byte of the length prefix
    AwaitingLength,
    /// One byte of the length prefix has arrived
    AwaitingLengthSecondByte { high: u8 },
    /// Length known, collecting the body
    AccumulatingBody { expected: usize },
}

/// Reassembles frame bodies from arbitrarily fragmented reads
///
/// A single call to [`FrameParser::feed`] can complete zero, one or many
/// frames; bytes belonging to the next frame are kept for the next call.
#[derive(Debug)]
pub struct FrameParser {
    state: ParseState,
    body: Vec<u8>,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::AwaitingLength,
            body: Vec::with_capacity(512),
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Bytes collected for the frame currently being read
    pub fn buffered(&self) -> usize {
        self.body.len()
    }

    /// Feeds one read's worth of bytes
    ///
    /// `on_frame` is called with each completed body (opcode + payload) in
    /// arrival order. Returns the number of completed frames.
    pub fn feed<F>(&mut self, mut data: &[u8], mut on_frame: F) -> usize
    where
        F: FnMut(&[u8]),
    {
        let mut completed = 0;

        while !data.is_empty() {
            match self.state {
                ParseState::AwaitingLength => {
                    if data.len() >= LENGTH_PREFIX_SIZE {
                        let expected = u16::from_be_bytes([data[0], data[1]]) as usize;
                        data = &data[LENGTH_PREFIX_SIZE..];
                        self.state = ParseState::AccumulatingBody { expected };
                    } else {
                        self.state = ParseState::AwaitingLengthSecondByte { high: data[0] };
                        data = &data[1..];
                    }
                }
                ParseState::AwaitingLengthSecondByte { high } => {
                    let expected = u16::from_be_bytes([high, data[0]]) as usize;
                    data = &data[1..];
                    self.state = ParseState::AccumulatingBody { expected };
                }
                ParseState::AccumulatingBody { expected } => {
                    let missing = expected - self.body.len();
                    let take = missing.min(data.len());
                    self.body.extend_from_slice(&data[..take]);
                    data = &data[take..];
                }
            }

            if self.complete_pending(&mut on_frame) {
                completed += 1;
            }
        }

        completed
    }

    /// Emits the body if the declared length has been reached and resets
    /// for the next frame
    fn complete_pending<F>(&mut self, on_frame: &mut F) -> bool
    where
        F: FnMut(&[u8]),
    {
        match self.state {
            ParseState::AccumulatingBody { expected } if self.body.len() == expected => {
                on_frame(&self.body);
                self.body.clear();
                self.state = ParseState::AwaitingLength;
                true
            }
            _ => false,
        }
    }
}

/// Splits a body into its opcode and payload
///
/// Returns `None` when the body is too short to hold an opcode.
pub fn split_body(body: &[u8]) -> Option<(u16, &[u8])> {
    if body.len() < OPCODE_SIZE {
        return None;
    }
    let opcode = u16::from_be_bytes([body[0], body[1]]);
    Some((opcode, &body[OPCODE_SIZE..]))
}

/// Serializes a packet into a single wire frame
///
/// Rejects packets whose body does not fit the 16-bit length field or
/// whose frame would exceed [`MAX_FRAME_SIZE`].
pub fn encode_frame(packet: &Packet) -> Result<FrameBuf> {
    let body_len = packet.payload().len() + OPCODE_SIZE;
    let frame_len = body_len + LENGTH_PREFIX_SIZE;

    if body_len > u16::MAX as usize || frame_len > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: frame_len,
            limit: MAX_FRAME_SIZE.min(u16::MAX as usize + LENGTH_PREFIX_SIZE),
        });
    }

    let mut frame = FrameBuf::with_capacity(frame_len);
    frame.extend_from_slice(&(body_len as u16).to_be_bytes());
    frame.extend_from_slice(&packet.opcode().to_be_bytes());
    frame.extend_from_slice(packet.payload());
    Ok(frame)
}
