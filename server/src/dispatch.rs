//! Opcode dispatch table
//!
//! Maps each wire opcode to the handler that consumes it. The table is
//! built once during startup through `&mut self` methods and is read-only
//! afterwards (it lives inside the shared [`crate::context::ServerContext`]),
//! so lookups need no synchronization.

use crate::error::{Result, ServerError};
use crate::session::{MovementHandler, Session};
use crate::zone::ZoneView;
use shared::{Opcode, Packet, OPCODE_COUNT};
use std::fmt;
use std::sync::Arc;

/// Consumes one decoded packet on the zone thread
///
/// Called from [`Session::update`] while the zone membership is locked, so
/// handlers can broadcast through `zone` but must not try to change the
/// membership of that same zone.
pub trait PacketHandler: Send + Sync {
    fn handle(&self, session: &Session, zone: &ZoneView<'_>, packet: &Packet) -> Result<()>;
}

/// Adapts a closure into a [`PacketHandler`]
struct FnHandler<F>(F);

impl<F> PacketHandler for FnHandler<F>
where
    F: Fn(&Session, &ZoneView<'_>, &Packet) -> Result<()> + Send + Sync,
{
    fn handle(&self, session: &Session, zone: &ZoneView<'_>, packet: &Packet) -> Result<()> {
        (self.0)(session, zone, packet)
    }
}

/// Fixed-size opcode → handler table
pub struct OpcodeTable {
    slots: Box<[Option<Arc<dyn PacketHandler>>]>,
}

impl OpcodeTable {
    /// Creates a table with `size` unset slots
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| None).collect(),
        }
    }

    /// The table used by the server: every known opcode slot, with the
    /// movement handler registered for [`Opcode::CsMove`]
    pub fn standard() -> Self {
        let mut table = Self::new(OPCODE_COUNT);
        table.slots[Opcode::CsMove.index()] = Some(Arc::new(MovementHandler));
        table
    }

    pub fn register(
        &mut self,
        opcode: impl Into<u16>,
        handler: Arc<dyn PacketHandler>,
    ) -> Result<()> {
        let opcode = opcode.into();
        let slot = self
            .slots
            .get_mut(opcode as usize)
            .ok_or(ServerError::UnknownOpcode(opcode))?;
        *slot = Some(handler);
        Ok(())
    }

    pub fn register_fn<F>(&mut self, opcode: impl Into<u16>, handler: F) -> Result<()>
    where
        F: Fn(&Session, &ZoneView<'_>, &Packet) -> Result<()> + Send + Sync + 'static,
    {
        self.register(opcode, Arc::new(FnHandler(handler)))
    }

    /// Number of slots; valid opcodes are below this
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn handler(&self, opcode: u16) -> Option<&Arc<dyn PacketHandler>> {
        self.slots.get(opcode as usize).and_then(Option::as_ref)
    }

    /// Queues `packet` on the session's inbound queue if a handler is set
    ///
    /// Unset slots and opcodes outside the table drop the packet silently.
    /// Returns whether the packet was queued.
    pub fn dispatch(&self, session: &Session, packet: Arc<Packet>) -> bool {
        match self.handler(packet.opcode()) {
            Some(handler) => {
                session.queue_packet(packet, Arc::clone(handler));
                true
            }
            None => false,
        }
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for OpcodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| index)
            .collect();

        f.debug_struct("OpcodeTable")
            .field("size", &self.slots.len())
            .field("registered", &registered)
            .finish()
    }
}
