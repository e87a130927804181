//! Zone pools: one simulation thread ticking a set of zones

use crate::shutdown::Shutdown;
use crate::tick::TickPacer;
use crate::zone::{Zone, ZoneId};
use log::{debug, info};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type PoolId = u32;

#[derive(Debug)]
pub struct ZonePool {
    id: PoolId,
    tick_interval: Duration,
    zones: Mutex<Vec<Arc<Zone>>>,
}

impl ZonePool {
    pub fn new(id: PoolId, tick_interval: Duration) -> Self {
        Self {
            id,
            tick_interval,
            zones: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Adds a zone; zones are ticked in the order they were added
    pub fn add_zone(&self, zone: Arc<Zone>) {
        debug!("Zone {} added to pool {}", zone.id(), self.id);
        self.zones.lock().push(zone);
    }

    pub fn remove_zone(&self, id: ZoneId) -> Option<Arc<Zone>> {
        let mut zones = self.zones.lock();
        let index = zones.iter().position(|zone| zone.id() == id)?;
        Some(zones.remove(index))
    }

    pub fn zones(&self) -> Vec<Arc<Zone>> {
        self.zones.lock().clone()
    }

    pub fn first_zone(&self) -> Option<Arc<Zone>> {
        self.zones.lock().first().cloned()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.lock().len()
    }

    /// Ticks every zone once; returns the packets processed
    pub fn update(&self, elapsed: Duration) -> usize {
        self.zones
            .lock()
            .iter()
            .map(|zone| zone.update(elapsed))
            .sum()
    }

    /// Runs the tick loop on the calling thread until `shutdown` fires
    ///
    /// The stop flag is checked once per tick, so stopping takes at most
    /// one tick plus its sleep.
    pub fn run(&self, shutdown: &Shutdown) {
        info!(
            "Zone pool {} started with {} zones, ticking every {:?}",
            self.id,
            self.zone_count(),
            self.tick_interval
        );

        let mut pacer = TickPacer::new(self.tick_interval);
        let mut previous = Instant::now();
        let mut ticks: u64 = 0;

        while !shutdown.is_stopping() {
            let now = Instant::now();
            let elapsed = now - previous;
            previous = now;

            self.update(elapsed);
            ticks += 1;

            match pacer.next_sleep(elapsed) {
                Some(sleep) => thread::sleep(sleep),
                None => debug!(
                    "Zone pool {} tick {} overran: {:?} since previous tick",
                    self.id, ticks, elapsed
                ),
            }
        }

        info!("Zone pool {} stopped after {} ticks", self.id, ticks);
    }

    /// Starts [`ZonePool::run`] on a dedicated named thread
    pub fn spawn(self: &Arc<Self>, shutdown: Shutdown) -> io::Result<JoinHandle<()>> {
        let pool = Arc::clone(self);
        thread::Builder::new()
            .name(format!("zone-pool-{}", self.id))
            .spawn(move || pool.run(&shutdown))
    }
}
