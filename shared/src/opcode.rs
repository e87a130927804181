/// Packet types, identical on client and server
///
/// `CS_` opcodes travel client to server, `SC_` opcodes server to client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Opcode {
    Reserved = 0,
    Reserved2 = 10,
    /// Client reports its position: three f32 (x, y, z)
    CsMove = 11,
    /// Server relays another player's position: three f32 (x, y, z)
    ScMove = 12,
}

/// Size of the dispatch table; every valid opcode is below this
pub const OPCODE_COUNT: usize = 13;

impl Opcode {
    pub const ALL: [Opcode; 4] = [
        Opcode::Reserved,
        Opcode::Reserved2,
        Opcode::CsMove,
        Opcode::ScMove,
    ];

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl From<Opcode> for u16 {
    fn from(opcode: Opcode) -> Self {
        opcode.as_u16()
    }
}

impl TryFrom<u16> for Opcode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Opcode::ALL
            .into_iter()
            .find(|opcode| opcode.as_u16() == value)
            .ok_or(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_values() {
        assert_eq!(u16::from(Opcode::CsMove), 11);
        assert_eq!(u16::from(Opcode::ScMove), 12);
        assert_eq!(Opcode::try_from(11), Ok(Opcode::CsMove));
        assert_eq!(Opcode::try_from(5), Err(5));
    }

    #[test]
    fn test_all_opcodes_fit_table() {
        for opcode in Opcode::ALL {
            assert!(opcode.index() < OPCODE_COUNT);
        }
    }
}
