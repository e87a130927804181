//! Server network layer: TCP accept loop and connection registry
//!
//! Runs entirely on the I/O thread's single-threaded runtime. Each
//! accepted socket becomes a [`Connection`] task; finished tasks report
//! back through a [`NetworkEvent`] channel so the registry stays current.

use crate::connection::Connection;
use crate::context::ServerContext;
use crate::error::Result;
use crate::pool::BufferPool;
use crate::session::SessionId;
use log::{debug, error, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Messages sent from connection tasks to the accept loop
#[derive(Debug)]
pub enum NetworkEvent {
    ConnectionClosed { id: SessionId },
}

pub struct Network {
    listener: TcpListener,
    context: Arc<ServerContext>,
    pool: BufferPool,
    connections: HashMap<SessionId, JoinHandle<()>>,

    // Communication channels
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Network {
    /// Binds the configured address
    pub async fn bind(context: Arc<ServerContext>) -> Result<Self> {
        let listener = TcpListener::bind(context.config().bind_addr()).await?;
        Ok(Self::with_listener(listener, context))
    }

    /// Adopts a listener bound outside the runtime
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_std(listener: std::net::TcpListener, context: Arc<ServerContext>) -> Result<Self> {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        Ok(Self::with_listener(listener, context))
    }

    fn with_listener(listener: TcpListener, context: Arc<ServerContext>) -> Self {
        let config = context.config();
        let pool = BufferPool::new(config.recv_block_count, config.recv_block_size);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            listener,
            context,
            pool,
            connections: HashMap::new(),
            event_tx,
            event_rx,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until a stop is requested, then waits for every
    /// connection task to finish
    pub async fn listen(mut self) -> Result<()> {
        let addr = self.local_addr()?;
        let mut stop = self.context.shutdown().subscribe();
        info!("Listening on {}", addr);

        loop {
            tokio::select! {
                _ = stop.wait() => break,
                Some(event) = self.event_rx.recv() => self.handle_event(event),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.on_new_connection(stream, peer),
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        self.close_connections().await;
        info!("Stopped listening on {}", addr);
        Ok(())
    }

    fn on_new_connection(&mut self, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", peer, e);
        }

        let connection =
            match Connection::accept(stream, peer, Arc::clone(&self.context), self.pool.clone()) {
                Ok(connection) => connection,
                Err(e) => {
                    error!("Rejecting connection from {}: {}", peer, e);
                    return;
                }
            };

        let id = connection.id();
        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            connection.run().await;
            let _ = event_tx.send(NetworkEvent::ConnectionClosed { id });
        });

        self.connections.insert(id, handle);
        debug!("{} connections open", self.connections.len());
    }

    fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::ConnectionClosed { id } => {
                self.connections.remove(&id);
                debug!("{} connections open", self.connections.len());
            }
        }
    }

    async fn close_connections(&mut self) {
        let open = self.connections.len();
        for (id, handle) in self.connections.drain() {
            if let Err(e) = handle.await {
                error!("Connection task for session {} failed: {}", id, e);
            }
        }
        if open > 0 {
            info!("Closed {} connections", open);
        }
    }
}
