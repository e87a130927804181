//! Server lifecycle: startup, thread layout and orderly shutdown
//!
//! ```text
//!   network thread (tokio current_thread)      zone-pool-N threads
//!   ┌──────────────────────────────┐           ┌──────────────────────┐
//!   │ accept loop                  │  inbound  │ tick: zone.update()  │
//!   │ connection tasks ────────────┼──────────▶│   session.update()   │
//!   │   ◀──────────────────────────┼───────────┤   handlers           │
//!   └──────────────────────────────┘  outbound └──────────────────────┘
//! ```
//!
//! Only one [`Server`] may exist per process at a time.

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::dispatch::OpcodeTable;
use crate::error::{Result, ServerError};
use crate::network::Network;
use log::{error, info};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

static INSTANCE_ACTIVE: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub struct Server {
    context: Arc<ServerContext>,
    started: AtomicBool,
}

impl Server {
    /// Claims the process-wide server slot
    ///
    /// Fails with [`ServerError::AlreadyRunning`] while another `Server`
    /// is alive.
    pub fn new(config: ServerConfig) -> Result<Self> {
        Self::with_opcodes(config, OpcodeTable::standard())
    }

    pub fn with_opcodes(config: ServerConfig, opcodes: OpcodeTable) -> Result<Self> {
        config.validate()?;
        if INSTANCE_ACTIVE.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        Ok(Self {
            context: Arc::new(ServerContext::with_opcodes(config, opcodes)),
            started: AtomicBool::new(false),
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Binds the listener, creates the zones and starts every thread
    ///
    /// Returns once the server is accepting connections.
    pub fn start(&self) -> Result<RunningServer> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }

        let config = self.context.config();
        let listener = TcpListener::bind(config.bind_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let zones = self.context.zones();
        let mut pool_threads = Vec::with_capacity(config.zone_pools);
        for _ in 0..config.zone_pools {
            let pool = zones.create_zone_pool(config.tick_interval());
            for _ in 0..config.zones_per_pool {
                pool.add_zone(zones.create_zone());
            }
            match pool.spawn(self.context.shutdown().clone()) {
                Ok(handle) => pool_threads.push(handle),
                Err(e) => {
                    abandon_start(&self.context, pool_threads);
                    return Err(e.into());
                }
            }
        }

        let context = Arc::clone(&self.context);
        let network_thread = thread::Builder::new()
            .name("network".to_string())
            .spawn(move || run_network(listener, context));
        let network_thread = match network_thread {
            Ok(handle) => handle,
            Err(e) => {
                abandon_start(&self.context, pool_threads);
                return Err(e.into());
            }
        };

        info!("Server started on {}", local_addr);
        Ok(RunningServer {
            local_addr,
            network_thread,
            pool_threads,
            context: Arc::clone(&self.context),
        })
    }

    /// Requests a stop; safe to call from any thread, repeatedly
    pub fn stop(&self) {
        if self.context.shutdown().trigger() {
            info!("Stopping server");
        }
    }

    /// Starts the server and blocks until it has stopped
    pub fn run(&self) -> Result<()> {
        self.start()?.join()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.context.shutdown().trigger();
        INSTANCE_ACTIVE.store(false, Ordering::SeqCst);
    }
}

/// Handles to the threads of a started server
#[derive(Debug)]
pub struct RunningServer {
    local_addr: SocketAddr,
    network_thread: JoinHandle<Result<()>>,
    pool_threads: Vec<JoinHandle<()>>,
    context: Arc<ServerContext>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for every thread to exit, then tears down the zones
    pub fn join(self) -> Result<()> {
        let network = match self.network_thread.join() {
            Ok(result) => result,
            Err(_) => Err(ServerError::Io(io::Error::new(
                io::ErrorKind::Other,
                "network thread panicked",
            ))),
        };

        for handle in self.pool_threads {
            if handle.join().is_err() {
                error!("Zone pool thread panicked");
            }
        }

        let zones = self.context.zones();
        for pool in zones.pools() {
            zones.delete_zone_pool(pool.id());
        }

        info!("Server stopped");
        network
    }
}

/// Stops and joins the pool threads of a start that failed part way
fn abandon_start(context: &ServerContext, pool_threads: Vec<JoinHandle<()>>) {
    context.shutdown().trigger();
    for handle in pool_threads {
        if handle.join().is_err() {
            error!("Zone pool thread panicked");
        }
    }

    let zones = context.zones();
    for pool in zones.pools() {
        zones.delete_zone_pool(pool.id());
    }
}

/// Body of the network thread
fn run_network(listener: TcpListener, context: Arc<ServerContext>) -> Result<()> {
    let result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(ServerError::from)
        .and_then(|runtime| {
            let network_context = Arc::clone(&context);
            runtime.block_on(async move {
                let network = Network::from_std(listener, network_context)?;
                network.listen().await
            })
        });

    if let Err(e) = &result {
        error!("Network thread failed: {}", e);
        // Zone pools would otherwise tick forever
        context.shutdown().trigger();
    }
    result
}
