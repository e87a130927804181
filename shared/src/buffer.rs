//! Sequential typed read/write over a growable byte sequence.
//!
//! Values are written and read back in the same order; there are no type
//! tags, so both sides of a conversation have to agree on the schema of
//! each opcode out of band.
//!
//! Multi-byte scalars use the host's native byte order. Peers on hosts
//! with a different endianness will not agree on payload values; only the
//! frame header is normalized (see [`crate::frame`]).

use crate::{CodecError, Result};

/// Read side of the codec.
///
/// Implementors only expose their unread bytes and a way to consume them;
/// every typed read is provided on top of that. A failed read never moves
/// the cursor.
pub trait ByteRead {
    /// Bytes that have not been read yet
    fn remaining(&self) -> &[u8];

    /// Moves the read cursor forward by `count` bytes
    ///
    /// Callers must have checked `count <= self.remaining().len()`.
    fn advance(&mut self, count: usize);

    /// Number of unread bytes
    fn remaining_len(&self) -> usize {
        self.remaining().len()
    }

    /// Copies the next `N` bytes without consuming them
    fn peek_array<const N: usize>(&self) -> Result<[u8; N]> {
        let remaining = self.remaining();
        if remaining.len() < N {
            return Err(CodecError::ReadOutOfRange {
                requested: N,
                remaining: remaining.len(),
            });
        }

        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&remaining[..N]);
        Ok(bytes)
    }

    /// Consumes and returns the next `N` bytes
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.peek_array::<N>()?;
        self.advance(N);
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.read_array::<1>().map(u8::from_ne_bytes)
    }

    fn read_u16(&mut self) -> Result<u16> {
        self.read_array::<2>().map(u16::from_ne_bytes)
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.read_array::<4>().map(u32::from_ne_bytes)
    }

    fn read_u64(&mut self) -> Result<u64> {
        self.read_array::<8>().map(u64::from_ne_bytes)
    }

    fn read_i8(&mut self) -> Result<i8> {
        self.read_array::<1>().map(i8::from_ne_bytes)
    }

    fn read_i16(&mut self) -> Result<i16> {
        self.read_array::<2>().map(i16::from_ne_bytes)
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.read_array::<4>().map(i32::from_ne_bytes)
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.read_array::<8>().map(i64::from_ne_bytes)
    }

    /// A single byte, true iff it is greater than zero
    fn read_bool(&mut self) -> Result<bool> {
        self.read_u8().map(|byte| byte > 0)
    }

    /// Reads an IEEE-754 single, rejecting NaN and infinities
    fn read_f32(&mut self) -> Result<f32> {
        let value = f32::from_bits(u32::from_ne_bytes(self.peek_array::<4>()?));
        if !value.is_finite() {
            return Err(CodecError::NonFinite);
        }
        self.advance(4);
        Ok(value)
    }

    /// Reads an IEEE-754 double, rejecting NaN and infinities
    fn read_f64(&mut self) -> Result<f64> {
        let value = f64::from_bits(u64::from_ne_bytes(self.peek_array::<8>()?));
        if !value.is_finite() {
            return Err(CodecError::NonFinite);
        }
        self.advance(8);
        Ok(value)
    }
}

/// Owned, growable byte sequence with an append-only write cursor and a
/// monotonic read cursor.
///
/// The write cursor is the length of the underlying vector. The read
/// cursor never passes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
    read_pos: usize,
}

impl ByteBuffer {
    /// Creates an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            read_pos: 0,
        }
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Current read position
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Every written byte, independent of the read cursor
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Borrowed reader starting at the beginning of the buffer
    pub fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.bytes)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> &mut Self {
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.write_u32(value.to_bits())
    }

    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.write_u64(value.to_bits())
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write_u8(u8::from(value))
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes, read_pos: 0 }
    }
}

impl ByteRead for ByteBuffer {
    fn remaining(&self) -> &[u8] {
        &self.bytes[self.read_pos..]
    }

    fn advance(&mut self, count: usize) {
        debug_assert!(self.read_pos + count <= self.bytes.len());
        self.read_pos += count;
    }
}

/// Borrowed read cursor over a byte slice
///
/// Used to decode packets that are shared between threads, where the
/// owner cannot hand out a mutable read cursor.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

impl ByteRead for ByteReader<'_> {
    fn remaining(&self) -> &[u8] {
        &self.bytes[self.pos..]
    }

    fn advance(&mut self, count: usize) {
        debug_assert!(self.pos + count <= self.bytes.len());
        self.pos += count;
    }
}
