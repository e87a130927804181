use std::ops::{Deref, DerefMut};

use crate::buffer::{ByteBuffer, ByteReader};
use crate::opcode::Opcode;

/// A [`ByteBuffer`] tagged with a 16-bit opcode
///
/// Outbound packets are built by appending to the body through `DerefMut`.
/// Inbound packets are created once from a received frame body and then
/// shared across threads as `Arc<Packet>`; readers decode them through
/// [`Packet::reader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    opcode: u16,
    body: ByteBuffer,
}

impl Packet {
    /// Creates an empty packet for sending
    pub fn new(opcode: impl Into<u16>) -> Self {
        Self {
            opcode: opcode.into(),
            body: ByteBuffer::with_capacity(64),
        }
    }

    /// Wraps a received body
    pub fn from_body(opcode: u16, body: Vec<u8>) -> Self {
        Self {
            opcode,
            body: ByteBuffer::from(body),
        }
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// The opcode if it is one this build knows about
    pub fn known_opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode).ok()
    }

    /// Payload bytes, excluding the opcode
    pub fn payload(&self) -> &[u8] {
        self.body.as_bytes()
    }

    /// Fresh read cursor at the start of the payload
    pub fn reader(&self) -> ByteReader<'_> {
        self.body.reader()
    }
}

impl Deref for Packet {
    type Target = ByteBuffer;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

impl DerefMut for Packet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ByteRead;

    #[test]
    fn test_build_and_read_packet() {
        let mut packet = Packet::new(Opcode::ScMove);
        packet.write_u32(42).write_i16(-3);

        assert_eq!(packet.opcode(), 12);
        assert_eq!(packet.known_opcode(), Some(Opcode::ScMove));
        assert_eq!(packet.len(), 6);

        let mut reader = packet.reader();
        assert_eq!(reader.read_u32().unwrap(), 42);
        assert_eq!(reader.read_i16().unwrap(), -3);
    }

    #[test]
    fn test_from_body_keeps_bytes() {
        let packet = Packet::from_body(0x0B, vec![0xAA, 0xBB, 0xBC]);
        assert_eq!(packet.opcode(), 11);
        assert_eq!(packet.payload(), &[0xAA, 0xBB, 0xBC]);
    }

    #[test]
    fn test_unknown_opcode() {
        let packet = Packet::from_body(0xFFFF, vec![1]);
        assert_eq!(packet.known_opcode(), None);
    }
}
