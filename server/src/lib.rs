//! # Zone Server Library
//!
//! This library provides a multithreaded TCP game server. Clients stream
//! length-prefixed binary packets; the server groups connected players into
//! zones and relays each player's movement to everyone else in the same
//! zone.
//!
//! ## Core Responsibilities
//!
//! ### Connection Handling
//! A single network thread accepts TCP connections and drives one async
//! task per socket. The task reassembles frames from fragmented reads,
//! validates them and queues each packet on its session, then writes the
//! packets queued for the client back out.
//!
//! ### Zone Simulation
//! Zones are ticked by zone pool threads at a fixed rate. Every tick each
//! session in the zone drains its inbound queue and runs the registered
//! handler for every packet. Handlers talk to the rest of the zone through
//! a [`zone::ZoneView`].
//!
//! ### Movement Relay
//! The only gameplay handler: a client's position report is decoded and
//! re-sent as a position update to every other session in its zone.
//!
//! ## Architecture Design
//!
//! ### Thread Layout
//! - **Network thread**: tokio `current_thread` runtime with the accept
//!   loop and all connection tasks
//! - **Zone pool threads**: one per pool, plain OS threads sleeping between
//!   ticks
//!
//! The two sides never share mutable state directly. Packets go to the
//! zone threads through a lock-free queue per session and come back
//! through an unbounded channel per connection, which also wakes the
//! connection task.
//!
//! ### Ownership
//! The connection owns its session. Zones hold weak references only, so a
//! closed connection can never be kept alive by the simulation. Leaving a
//! zone happens when the connection drops its
//! [`session::SessionHandle`].
//!
//! ### Lock Order
//! Manager, then pool, then zone membership. Packet handlers run with the
//! zone membership locked and must not change membership themselves.
//!
//! ## Module Organization
//!
//! ### Wire Handling (`connection`, `network`, `pool`)
//! - Accept loop and connection registry
//! - Frame validation and dispatch
//! - Fixed-size receive buffer pool shared by all connections
//!
//! ### Simulation (`zone`, `zone_pool`, `zone_manager`, `tick`)
//! - Zone membership and broadcast
//! - Tick loop with sleep compensation
//! - Pool registry and session placement
//!
//! ### Dispatch (`dispatch`, `session`)
//! - Opcode to handler table
//! - Per-session inbound queue and the movement handler
//!
//! ### Lifecycle (`server`, `context`, `shutdown`, `config`, `error`)
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::server::Server;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default())?;
//!
//!     // Binds 0.0.0.0:40000, starts one zone pool ticking at 20Hz and
//!     // blocks until `Server::stop` is called from another thread
//!     server.run()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol
//!
//! ```text
//! [u16 BE body length] [u16 BE opcode] [payload]
//! ```
//!
//! See the `shared` crate for the codec. Frames whose body is shorter than
//! three bytes, or whose opcode falls outside the dispatch table, are
//! dropped and logged.

pub mod config;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod network;
pub mod pool;
pub mod server;
pub mod session;
pub mod shutdown;
pub mod tick;
pub mod zone;
pub mod zone_manager;
pub mod zone_pool;

pub use config::{MalformedFramePolicy, ServerConfig};
pub use error::{FrameError, Result, ServerError};
pub use server::{RunningServer, Server};
