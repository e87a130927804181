//! Server configuration
//!
//! Values come from the built-in defaults, optionally overridden by a TOML
//! file and then by command line flags (see `main.rs`).

use crate::error::{Result, ServerError};
use crate::tick::TICK_RATE;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// What to do with a frame that is too short or carries an opcode outside
/// the dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MalformedFramePolicy {
    /// Log the frame, drop it and keep the connection open
    #[default]
    Log,
    /// Log the frame and close the connection
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub host: IpAddr,
    /// TCP port to listen on
    pub port: u16,
    /// Zone pool ticks per second
    pub tick_rate: u32,
    /// Number of zone pools, each with its own simulation thread
    pub zone_pools: usize,
    /// Zones created in every pool
    pub zones_per_pool: usize,
    /// Size of one receive block in bytes
    pub recv_block_size: usize,
    /// Number of receive blocks shared by all connections
    pub recv_block_count: usize,
    /// Handling of malformed frames
    pub malformed_frames: MalformedFramePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: shared::DEFAULT_PORT,
            tick_rate: TICK_RATE,
            zone_pools: 1,
            zones_per_pool: 1,
            recv_block_size: 2048,
            recv_block_count: 1024,
            malformed_frames: MalformedFramePolicy::Log,
        }
    }
}

impl ServerConfig {
    /// Loads a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ServerError::Config(format!("failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ServerError::Config(format!(
                "tick_rate must be between 1 and 1000, got {}",
                self.tick_rate
            )));
        }
        if self.zone_pools == 0 || self.zones_per_pool == 0 {
            return Err(ServerError::Config(
                "at least one zone pool with one zone is required".to_string(),
            ));
        }
        if self.recv_block_count == 0 {
            return Err(ServerError::Config(
                "recv_block_count must be greater than zero".to_string(),
            ));
        }
        if !(64..=65536).contains(&self.recv_block_size) {
            return Err(ServerError::Config(format!(
                "recv_block_size must be between 64 and 65536, got {}",
                self.recv_block_size
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Nominal time between two ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}
