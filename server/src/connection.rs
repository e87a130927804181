//! # Client Connections
//!
//! One [`Connection`] per accepted TCP socket, driven as a tokio task on
//! the I/O thread. The task multiplexes three event sources:
//!
//! - **Readability**: a block is taken from the shared [`BufferPool`], one
//!   non-blocking read is done into it and the bytes are fed to the
//!   connection's [`FrameParser`]. Every completed body is validated and
//!   dispatched to the session's inbound queue.
//! - **Outbound packets**: zone threads push replies into the session's
//!   [`OutboundQueue`]; the task wakes up, drains the queue and writes one
//!   frame per packet.
//! - **Shutdown**: the task returns as soon as a stop is requested.
//!
//! ## Failure handling
//!
//! Malformed frames (too short, opcode outside the dispatch table) are
//! logged and dropped; under [`MalformedFramePolicy::Disconnect`] the
//! connection is closed as well. Read errors, end of stream and an
//! exhausted receive pool close the connection. Write errors are logged
//! and the packet is lost; the connection stays up until the read side
//! notices the peer is gone.

use crate::config::MalformedFramePolicy;
use crate::context::ServerContext;
use crate::dispatch::OpcodeTable;
use crate::error::{FrameError, Result, ServerError};
use crate::pool::BufferPool;
use crate::session::{Session, SessionHandle, SessionId};
use crate::shutdown::StopListener;
use log::{debug, error, info, trace};
use shared::frame::MIN_BODY_LEN;
use shared::{encode_frame, split_body, FrameParser, Packet};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Sending side of a connection's outbound packet queue
///
/// Cheap to clone. Queuing never blocks and wakes the connection task.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<Arc<Packet>>,
}

impl OutboundQueue {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Arc<Packet>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false if the connection has already closed
    pub fn queue_send_packet(&self, packet: Arc<Packet>) -> bool {
        self.tx.send(packet).is_ok()
    }
}

/// Validates one reassembled body and hands it to the dispatch table
///
/// Returns whether a handler accepted the packet. Valid frames whose
/// opcode slot is unset are dropped silently.
pub fn process_frame(
    body: &[u8],
    opcodes: &OpcodeTable,
    session: &Session,
) -> std::result::Result<bool, FrameError> {
    if body.len() < MIN_BODY_LEN {
        return Err(FrameError::TooShort { len: body.len() });
    }
    let Some((opcode, payload)) = split_body(body) else {
        return Err(FrameError::TooShort { len: body.len() });
    };
    if opcode as usize >= opcodes.len() {
        return Err(FrameError::OpcodeOutOfRange {
            opcode,
            table_size: opcodes.len(),
        });
    }

    let packet = Arc::new(Packet::from_body(opcode, payload.to_vec()));
    Ok(opcodes.dispatch(session, packet))
}

/// Why a connection task ended
#[derive(Debug)]
pub enum CloseReason {
    PeerClosed,
    Shutdown,
    Error(ServerError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "closed by peer"),
            CloseReason::Shutdown => write!(f, "server shutting down"),
            CloseReason::Error(e) => write!(f, "{}", e),
        }
    }
}

enum ReadOutcome {
    Continue,
    Eof,
}

pub struct Connection {
    id: SessionId,
    peer: SocketAddr,
    stream: TcpStream,
    parser: FrameParser,
    session: SessionHandle,
    outbound: mpsc::UnboundedReceiver<Arc<Packet>>,
    context: Arc<ServerContext>,
    pool: BufferPool,
    dropped_frames: u64,
}

impl Connection {
    /// Creates the session for a freshly accepted socket and places it in
    /// a zone
    pub fn accept(
        stream: TcpStream,
        peer: SocketAddr,
        context: Arc<ServerContext>,
        pool: BufferPool,
    ) -> Result<Self> {
        let id = context.next_session_id();
        let (queue, outbound) = OutboundQueue::channel();
        let session = Session::new(id, peer, queue);
        let zone = context.zones().assign_zone(&session)?;
        info!("Session {} from {} entered zone {}", id, peer, zone.id());

        Ok(Self {
            id,
            peer,
            stream,
            parser: FrameParser::new(),
            session: SessionHandle::new(session, context.shutdown().clone()),
            outbound,
            context,
            pool,
            dropped_frames: 0,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Drives the connection until the peer leaves, an error occurs or the
    /// server stops
    pub async fn run(mut self) -> CloseReason {
        let mut stop = self.context.shutdown().subscribe();

        let reason = loop {
            tokio::select! {
                _ = stop.wait() => break CloseReason::Shutdown,
                Some(packet) = self.outbound.recv() => {
                    if !self.send_queued_packets(packet, &mut stop).await {
                        break CloseReason::Shutdown;
                    }
                }
                ready = self.stream.readable() => {
                    if let Err(e) = ready {
                        break CloseReason::Error(e.into());
                    }
                    match self.read_ready() {
                        Ok(ReadOutcome::Continue) => {}
                        Ok(ReadOutcome::Eof) => break CloseReason::PeerClosed,
                        Err(e) => break CloseReason::Error(e),
                    }
                }
            }
        };

        match &reason {
            CloseReason::Error(e) => error!("Session {} ({}): {}", self.id, self.peer, e),
            _ => debug!("Session {} ({}): {}", self.id, self.peer, reason),
        }
        info!(
            "Session {} disconnected ({} malformed frames dropped)",
            self.id, self.dropped_frames
        );
        reason
    }

    /// Performs one non-blocking read after a readiness notification
    fn read_ready(&mut self) -> Result<ReadOutcome> {
        let mut block = self.pool.allocate()?;

        match self.stream.try_read(&mut block) {
            Ok(0) => Ok(ReadOutcome::Eof),
            Ok(n) => {
                trace!("Session {} read {} bytes", self.id, n);
                self.on_data(&block[..n])?;
                Ok(ReadOutcome::Continue)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::Continue),
            Err(e) => Err(e.into()),
        }
    }

    /// Feeds received bytes through the parser and dispatches each frame
    fn on_data(&mut self, data: &[u8]) -> Result<()> {
        let policy = self.context.config().malformed_frames;
        let opcodes = self.context.opcodes();
        let session: &Session = &self.session;
        let (id, peer) = (self.id, self.peer);
        let dropped = &mut self.dropped_frames;
        let mut violation = None;

        self.parser.feed(data, |body| {
            if violation.is_some() && policy == MalformedFramePolicy::Disconnect {
                return;
            }
            if let Err(e) = process_frame(body, opcodes, session) {
                error!("Session {} ({}): dropped frame: {}", id, peer, e);
                *dropped += 1;
                if violation.is_none() {
                    violation = Some(e);
                }
            }
        });

        match (violation, policy) {
            (Some(e), MalformedFramePolicy::Disconnect) => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Writes `first` and everything else already queued
    ///
    /// Returns false if a stop was requested while a write was pending.
    async fn send_queued_packets(&mut self, first: Arc<Packet>, stop: &mut StopListener) -> bool {
        if !self.write_packet(&first, stop).await {
            return false;
        }
        while let Ok(packet) = self.outbound.try_recv() {
            if !self.write_packet(&packet, stop).await {
                return false;
            }
        }
        true
    }

    /// Writes one frame; a peer that stops reading cannot hold up shutdown
    async fn write_packet(&mut self, packet: &Packet, stop: &mut StopListener) -> bool {
        let frame = match encode_frame(packet) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Session {}: failed encoding packet: {}", self.id, e);
                return true;
            }
        };

        tokio::select! {
            _ = stop.wait() => false,
            written = self.stream.write_all(&frame) => {
                if let Err(e) = written {
                    error!(
                        "Session {}: failed writing packet with opcode {}: {}",
                        self.id,
                        packet.opcode(),
                        e
                    );
                }
                true
            }
        }
    }
}
