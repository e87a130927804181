//! Registry of zone pools and session placement

use crate::error::{Result, ServerError};
use crate::session::Session;
use crate::zone::{Zone, ZoneId};
use crate::zone_pool::{PoolId, ZonePool};
use log::{debug, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Owns every zone pool
///
/// Lock order is manager, then pool, then zone; nothing here takes them
/// the other way round.
#[derive(Debug, Default)]
pub struct ZoneManager {
    pools: Mutex<Vec<Arc<ZonePool>>>,
    next_pool_id: AtomicU32,
    next_zone_id: AtomicU32,
}

impl ZoneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pool; the caller decides when to spawn its thread
    pub fn create_zone_pool(&self, tick_interval: Duration) -> Arc<ZonePool> {
        let id = self.next_pool_id.fetch_add(1, Ordering::Relaxed);
        let pool = Arc::new(ZonePool::new(id, tick_interval));
        self.pools.lock().push(Arc::clone(&pool));
        info!("Created zone pool {} ({:?} per tick)", id, tick_interval);
        pool
    }

    /// Allocates a zone with a fresh id, not yet attached to any pool
    pub fn create_zone(&self) -> Arc<Zone> {
        Arc::new(Zone::new(self.next_zone_id.fetch_add(1, Ordering::Relaxed)))
    }

    /// Removes a pool; its zones go away with the last reference
    pub fn delete_zone_pool(&self, id: PoolId) -> Option<Arc<ZonePool>> {
        let mut pools = self.pools.lock();
        let index = pools.iter().position(|pool| pool.id() == id)?;
        debug!("Deleted zone pool {}", id);
        Some(pools.remove(index))
    }

    pub fn pools(&self) -> Vec<Arc<ZonePool>> {
        self.pools.lock().clone()
    }

    pub fn find_zone(&self, id: ZoneId) -> Option<Arc<Zone>> {
        self.pools
            .lock()
            .iter()
            .flat_map(|pool| pool.zones())
            .find(|zone| zone.id() == id)
    }

    /// Places a new session in the first zone of the first pool
    ///
    /// A session that already has a zone stays where it is.
    pub fn assign_zone(&self, session: &Arc<Session>) -> Result<Arc<Zone>> {
        if let Some(zone) = session.zone() {
            return Ok(zone);
        }

        let zone = self
            .pools
            .lock()
            .iter()
            .find_map(|pool| pool.first_zone())
            .ok_or(ServerError::NoZoneAvailable)?;

        if zone.add_session(session) {
            Ok(zone)
        } else {
            session.zone().ok_or(ServerError::NoZoneAvailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OutboundQueue;
    use crate::session::SessionId;

    fn session(id: u64) -> Arc<Session> {
        let (queue, _rx) = OutboundQueue::channel();
        Session::new(SessionId(id), "127.0.0.1:9000".parse().unwrap(), queue)
    }

    #[test]
    fn test_no_zone_available() {
        let manager = ZoneManager::new();
        assert!(matches!(
            manager.assign_zone(&session(1)),
            Err(ServerError::NoZoneAvailable)
        ));

        // A pool without zones does not help
        manager.create_zone_pool(Duration::from_millis(50));
        assert!(matches!(
            manager.assign_zone(&session(1)),
            Err(ServerError::NoZoneAvailable)
        ));
    }

    #[test]
    fn test_assigns_first_zone_of_first_pool() {
        let manager = ZoneManager::new();
        let first = manager.create_zone_pool(Duration::from_millis(50));
        let second = manager.create_zone_pool(Duration::from_millis(50));
        let zone_a = manager.create_zone();
        let zone_b = manager.create_zone();
        first.add_zone(zone_a.clone());
        first.add_zone(zone_b);
        second.add_zone(manager.create_zone());

        for id in 0..3 {
            let assigned = manager.assign_zone(&session(id)).unwrap();
            assert_eq!(assigned.id(), zone_a.id());
        }
        assert_eq!(zone_a.len(), 3);
    }

    #[test]
    fn test_skips_empty_pools() {
        let manager = ZoneManager::new();
        manager.create_zone_pool(Duration::from_millis(50));
        let second = manager.create_zone_pool(Duration::from_millis(50));
        let zone = manager.create_zone();
        second.add_zone(zone.clone());

        assert_eq!(manager.assign_zone(&session(1)).unwrap().id(), zone.id());
    }

    #[test]
    fn test_reassign_keeps_existing_zone() {
        let manager = ZoneManager::new();
        let pool = manager.create_zone_pool(Duration::from_millis(50));
        let zone = manager.create_zone();
        pool.add_zone(zone.clone());

        let s = session(1);
        manager.assign_zone(&s).unwrap();
        assert_eq!(manager.assign_zone(&s).unwrap().id(), zone.id());
        assert_eq!(zone.len(), 1);
    }

    #[test]
    fn test_delete_pool() {
        let manager = ZoneManager::new();
        let pool = manager.create_zone_pool(Duration::from_millis(50));
        let zone = manager.create_zone();
        pool.add_zone(zone.clone());

        assert!(manager.find_zone(zone.id()).is_some());
        assert!(manager.delete_zone_pool(pool.id()).is_some());
        assert!(manager.delete_zone_pool(pool.id()).is_none());
        assert!(manager.pools().is_empty());
        assert!(manager.find_zone(zone.id()).is_none());
    }
}
