//! Zones: groups of sessions that see each other's movement
//!
//! Membership is written by the I/O thread (a session joining or leaving)
//! and read by the zone pool thread on every tick, so it sits behind a
//! mutex. The zone only keeps weak references; the connection owns the
//! session.

use crate::session::{Session, SessionId};
use log::{debug, trace};
use parking_lot::Mutex;
use shared::{Opcode, Packet, Position};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

pub type ZoneId = u32;

type Members = BTreeMap<SessionId, Weak<Session>>;

#[derive(Debug)]
pub struct Zone {
    id: ZoneId,
    members: Mutex<Members>,
}

impl Zone {
    pub fn new(id: ZoneId) -> Self {
        Self {
            id,
            members: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn id(&self) -> ZoneId {
        self.id
    }

    /// Adds a session and records this zone as its owner
    ///
    /// Returns false, leaving both untouched, if the session already
    /// belongs to a zone.
    pub fn add_session(self: &Arc<Self>, session: &Arc<Session>) -> bool {
        if !session.enter_zone(self) {
            return false;
        }
        self.members
            .lock()
            .insert(session.id(), Arc::downgrade(session));
        debug!("Session {} entered zone {}", session.id(), self.id);
        true
    }

    pub fn remove_session(&self, id: SessionId) -> bool {
        self.members.lock().remove(&id).is_some()
    }

    /// Whether `id` is registered, live or not
    pub fn contains(&self, id: SessionId) -> bool {
        self.members.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.members.lock().keys().copied().collect()
    }

    /// Runs one tick: every live member drains its inbound queue
    ///
    /// Entries whose session is gone are pruned first. Returns the number
    /// of packets processed across all members.
    pub fn update(&self, elapsed: Duration) -> usize {
        let mut members = self.members.lock();
        members.retain(|_, session| session.strong_count() > 0);

        // Strong references taken under the lock are released only after
        // it, so a session can never be destroyed while the zone is locked
        let live: Vec<Arc<Session>> = members.values().filter_map(Weak::upgrade).collect();
        let view = ZoneView {
            zone: self.id,
            members: &members,
        };

        let processed: usize = live
            .iter()
            .map(|session| session.update(elapsed, &view))
            .sum();

        drop(members);
        drop(live);

        if processed > 0 {
            trace!("Zone {} processed {} packets", self.id, processed);
        }
        processed
    }
}

/// Read access to a zone's members during a tick
pub struct ZoneView<'a> {
    zone: ZoneId,
    members: &'a Members,
}

impl<'a> ZoneView<'a> {
    pub fn zone_id(&self) -> ZoneId {
        self.zone
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Queues `packet` on every live member except `from`
    ///
    /// All recipients share the same packet. Returns the number of
    /// sessions it was queued for.
    pub fn broadcast_except(&self, from: SessionId, packet: Arc<Packet>) -> usize {
        self.members
            .iter()
            .filter(|(id, _)| **id != from)
            .filter_map(|(_, session)| session.upgrade())
            .filter(|session| session.send_packet(Arc::clone(&packet)))
            .count()
    }

    /// Relays a member's new position to everyone else in the zone
    pub fn send_position_update(&self, from: SessionId, position: Position) -> usize {
        let packet = Arc::new(position.to_packet(Opcode::ScMove));
        self.broadcast_except(from, packet)
    }
}
