//! # Player Sessions
//!
//! A [`Session`] is the game-side state of one connection. It is shared
//! between two threads:
//!
//! - the I/O thread queues decoded packets with [`Session::queue_packet`]
//! - the owning zone's pool thread drains them with [`Session::update`]
//!   once per tick and runs each packet's handler
//!
//! Replies travel the other way through the session's [`OutboundQueue`],
//! which is drained by the connection task on the I/O thread.
//!
//! The connection owns the session through a [`SessionHandle`]; zones only
//! hold weak references. Dropping the handle removes the session from its
//! zone, except while the server is stopping, when the zones are torn down
//! wholesale instead.

use crate::connection::OutboundQueue;
use crate::dispatch::PacketHandler;
use crate::error::Result;
use crate::shutdown::Shutdown;
use crate::zone::{Zone, ZoneView};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace, warn};
use shared::{Packet, Position};
use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

/// Identifier of a session, unique for the lifetime of the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A packet waiting for the zone thread, paired with its handler
pub struct QueuedPacket {
    pub packet: Arc<Packet>,
    pub handler: Arc<dyn PacketHandler>,
}

pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    inbound_tx: Sender<QueuedPacket>,
    inbound_rx: Receiver<QueuedPacket>,
    outbound: OutboundQueue,
    zone: OnceLock<Weak<Zone>>,
}

impl Session {
    pub fn new(id: SessionId, peer: SocketAddr, outbound: OutboundQueue) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = unbounded();
        Arc::new(Self {
            id,
            peer,
            inbound_tx,
            inbound_rx,
            outbound,
            zone: OnceLock::new(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Enqueues a packet for the next zone tick. Never blocks.
    pub fn queue_packet(&self, packet: Arc<Packet>, handler: Arc<dyn PacketHandler>) {
        // The receiver lives in `self`, so the channel cannot be disconnected
        let _ = self.inbound_tx.send(QueuedPacket { packet, handler });
    }

    /// Packets waiting for the zone thread
    pub fn pending(&self) -> usize {
        self.inbound_rx.len()
    }

    /// Runs the handler of every packet queued before this call
    ///
    /// Packets queued by the I/O thread while the drain is running are left
    /// for the next tick. A failing handler is logged and does not stop the
    /// remaining packets. Returns the number of packets processed.
    pub fn update(&self, elapsed: Duration, zone: &ZoneView<'_>) -> usize {
        let pending = self.inbound_rx.len();
        let mut processed = 0;

        for _ in 0..pending {
            let Ok(QueuedPacket { packet, handler }) = self.inbound_rx.try_recv() else {
                break;
            };
            if let Err(e) = handler.handle(self, zone, &packet) {
                warn!(
                    "Session {}: dropped packet with opcode {}: {}",
                    self.id,
                    packet.opcode(),
                    e
                );
            }
            processed += 1;
        }

        if processed > 0 {
            trace!(
                "Session {} processed {} packets ({:?} since last tick)",
                self.id,
                processed,
                elapsed
            );
        }
        processed
    }

    /// Hands a packet to the connection for sending
    ///
    /// Returns false once the connection has gone away.
    pub fn send_packet(&self, packet: Arc<Packet>) -> bool {
        self.outbound.queue_send_packet(packet)
    }

    /// Zone this session was assigned to, if it still exists
    pub fn zone(&self) -> Option<Arc<Zone>> {
        self.zone.get().and_then(Weak::upgrade)
    }

    /// Records the owning zone; a session enters exactly one zone
    pub(crate) fn enter_zone(&self, zone: &Arc<Zone>) -> bool {
        self.zone.set(Arc::downgrade(zone)).is_ok()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Owning reference held by the connection
#[derive(Debug)]
pub struct SessionHandle {
    session: Arc<Session>,
    shutdown: Shutdown,
}

impl SessionHandle {
    pub fn new(session: Arc<Session>, shutdown: Shutdown) -> Self {
        Self { session, shutdown }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Deref for SessionHandle {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.shutdown.is_stopping() {
            return;
        }
        if let Some(zone) = self.session.zone() {
            zone.remove_session(self.session.id());
            debug!("Session {} left zone {}", self.session.id(), zone.id());
        }
    }
}

/// Handles [`shared::Opcode::CsMove`]: decodes the reported position and
/// relays it to every other session in the zone
#[derive(Debug, Default, Clone, Copy)]
pub struct MovementHandler;

impl PacketHandler for MovementHandler {
    fn handle(&self, session: &Session, zone: &ZoneView<'_>, packet: &Packet) -> Result<()> {
        let position = Position::read_from(&mut packet.reader())?;
        trace!(
            "Session {} moved to ({}, {}, {})",
            session.id(),
            position.x,
            position.y,
            position.z
        );
        zone.send_position_update(session.id(), position);
        Ok(())
    }
}
