use crate::buffer::{ByteBuffer, ByteRead};
use crate::opcode::Opcode;
use crate::packet::Packet;
use crate::Result;

/// Payload of [`Opcode::CsMove`] and [`Opcode::ScMove`]: three consecutive
/// f32 in native byte order, 12 bytes
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const ENCODED_LEN: usize = 12;

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn read_from<R: ByteRead>(reader: &mut R) -> Result<Self> {
        let x = reader.read_f32()?;
        let y = reader.read_f32()?;
        let z = reader.read_f32()?;
        Ok(Self { x, y, z })
    }

    pub fn write_to(&self, buffer: &mut ByteBuffer) {
        buffer.write_f32(self.x).write_f32(self.y).write_f32(self.z);
    }

    /// Builds a movement packet carrying this position
    pub fn to_packet(&self, opcode: Opcode) -> Packet {
        let mut packet = Packet::new(opcode);
        self.write_to(&mut packet);
        packet
    }
}
