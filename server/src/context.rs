//! State shared by the I/O thread and the zone pool threads

use crate::config::ServerConfig;
use crate::dispatch::OpcodeTable;
use crate::session::SessionId;
use crate::shutdown::Shutdown;
use crate::zone_manager::ZoneManager;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct ServerContext {
    config: ServerConfig,
    opcodes: OpcodeTable,
    zones: ZoneManager,
    shutdown: Shutdown,
    next_session_id: AtomicU64,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_opcodes(config, OpcodeTable::standard())
    }

    /// Builds a context with a custom dispatch table
    pub fn with_opcodes(config: ServerConfig, opcodes: OpcodeTable) -> Self {
        Self {
            config,
            opcodes,
            zones: ZoneManager::new(),
            shutdown: Shutdown::new(),
            next_session_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn opcodes(&self) -> &OpcodeTable {
        &self.opcodes
    }

    pub fn zones(&self) -> &ZoneManager {
        &self.zones
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn next_session_id(&self) -> SessionId {
        SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed))
    }
}
