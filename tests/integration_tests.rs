//! Integration tests for the zone server
//!
//! These tests run the real network layer and a ticking zone pool against
//! plain TCP clients on the loopback interface.

use server::context::ServerContext;
use server::network::Network;
use server::{MalformedFramePolicy, ServerConfig};
use shared::{encode_frame, split_body, FrameParser, Opcode, Position};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Network layer plus one zone pool with a single zone
struct TestServer {
    addr: SocketAddr,
    context: Arc<ServerContext>,
    pool_thread: thread::JoinHandle<()>,
    network: tokio::task::JoinHandle<server::Result<()>>,
}

impl TestServer {
    async fn start(policy: MalformedFramePolicy) -> Self {
        let config = ServerConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            tick_rate: 50,
            malformed_frames: policy,
            ..ServerConfig::default()
        };
        let context = Arc::new(ServerContext::new(config));

        let zones = context.zones();
        let pool = zones.create_zone_pool(context.config().tick_interval());
        pool.add_zone(zones.create_zone());
        let pool_thread = pool.spawn(context.shutdown().clone()).unwrap();

        let network = Network::bind(Arc::clone(&context)).await.unwrap();
        let addr = network.local_addr().unwrap();
        let network = tokio::spawn(network.listen());

        Self {
            addr,
            context,
            pool_thread,
            network,
        }
    }

    fn zone_size(&self) -> usize {
        self.context
            .zones()
            .pools()
            .first()
            .and_then(|pool| pool.first_zone())
            .map(|zone| zone.len())
            .unwrap_or(0)
    }

    /// Waits until the zone holds exactly `count` sessions
    async fn wait_for_zone_size(&self, count: usize) {
        let deadline = Instant::now() + RECV_TIMEOUT;
        while self.zone_size() != count {
            assert!(
                Instant::now() < deadline,
                "zone size stuck at {}, expected {}",
                self.zone_size(),
                count
            );
            sleep(Duration::from_millis(5)).await;
        }
    }

    async fn stop(self) {
        self.context.shutdown().trigger();
        self.network.await.unwrap().unwrap();
        self.pool_thread.join().unwrap();
    }
}

struct TestClient {
    stream: TcpStream,
    parser: FrameParser,
    frames: VecDeque<Vec<u8>>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        stream.set_nodelay(true).unwrap();
        Self {
            stream,
            parser: FrameParser::new(),
            frames: VecDeque::new(),
        }
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    async fn send_position(&mut self, position: Position) {
        let frame = encode_frame(&position.to_packet(Opcode::CsMove)).unwrap();
        self.send_raw(&frame).await;
    }

    /// Next complete frame body, or `None` on timeout or close
    async fn next_frame(&mut self, wait: Duration) -> Option<Vec<u8>> {
        let deadline = Instant::now() + wait;
        let mut buf = [0u8; 1024];

        loop {
            if let Some(frame) = self.frames.pop_front() {
                return Some(frame);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return None,
                Ok(Ok(n)) => {
                    let frames = &mut self.frames;
                    self.parser
                        .feed(&buf[..n], |body| frames.push_back(body.to_vec()));
                }
            }
        }
    }

    async fn next_position(&mut self, wait: Duration) -> Option<Position> {
        let body = self.next_frame(wait).await?;
        let (opcode, payload) = split_body(&body)?;
        assert_eq!(opcode, Opcode::ScMove.as_u16());
        Position::read_from(&mut shared::ByteReader::new(payload)).ok()
    }

    /// Whether the server closes the socket within `wait`
    async fn closed_within(&mut self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        let mut buf = [0u8; 1024];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }
}

/// RELAY TESTS
mod relay_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// A's movement reaches B and C but never A itself
    #[tokio::test]
    async fn movement_broadcast_excludes_sender() {
        let server = TestServer::start(MalformedFramePolicy::Log).await;
        let mut a = TestClient::connect(server.addr).await;
        let mut b = TestClient::connect(server.addr).await;
        let mut c = TestClient::connect(server.addr).await;
        server.wait_for_zone_size(3).await;

        a.send_position(Position::new(10.0, -20.0, 3.5)).await;

        for client in [&mut b, &mut c] {
            let position = client.next_position(RECV_TIMEOUT).await.unwrap();
            assert_approx_eq!(position.x, 10.0);
            assert_approx_eq!(position.y, -20.0);
            assert_approx_eq!(position.z, 3.5);
        }
        assert!(a.next_frame(QUIET_PERIOD).await.is_none());

        server.stop().await;
    }

    /// A frame delivered one byte at a time is reassembled
    #[tokio::test]
    async fn fragmented_frame_is_reassembled() {
        let server = TestServer::start(MalformedFramePolicy::Log).await;
        let mut a = TestClient::connect(server.addr).await;
        let mut b = TestClient::connect(server.addr).await;
        server.wait_for_zone_size(2).await;

        let frame = encode_frame(&Position::new(1.0, 2.0, 3.0).to_packet(Opcode::CsMove)).unwrap();
        for byte in frame.iter() {
            a.send_raw(&[*byte]).await;
            sleep(Duration::from_millis(2)).await;
        }

        let position = b.next_position(RECV_TIMEOUT).await.unwrap();
        assert_approx_eq!(position.y, 2.0);

        server.stop().await;
    }

    /// Several frames in one write are each relayed, in order
    #[tokio::test]
    async fn coalesced_frames_are_relayed_in_order() {
        let server = TestServer::start(MalformedFramePolicy::Log).await;
        let mut a = TestClient::connect(server.addr).await;
        let mut b = TestClient::connect(server.addr).await;
        server.wait_for_zone_size(2).await;

        let mut bytes = Vec::new();
        for x in [1.0, 2.0, 3.0] {
            let packet = Position::new(x, 0.0, 0.0).to_packet(Opcode::CsMove);
            bytes.extend_from_slice(&encode_frame(&packet).unwrap());
        }
        a.send_raw(&bytes).await;

        for expected in [1.0, 2.0, 3.0] {
            let position = b.next_position(RECV_TIMEOUT).await.unwrap();
            assert_approx_eq!(position.x, expected);
        }

        server.stop().await;
    }
}

/// MALFORMED INPUT TESTS
mod malformed_tests {
    use super::*;

    /// Short frames and unknown opcodes are dropped, the connection lives on
    #[tokio::test]
    async fn malformed_frames_are_dropped_under_log_policy() {
        let server = TestServer::start(MalformedFramePolicy::Log).await;
        let mut a = TestClient::connect(server.addr).await;
        let mut b = TestClient::connect(server.addr).await;
        server.wait_for_zone_size(2).await;

        // Body of two bytes, then opcode 0xFFFF, then an unset slot
        a.send_raw(&[0x00, 0x02, 0x00, 0x0B]).await;
        a.send_raw(&[0x00, 0x03, 0xFF, 0xFF, 0x01]).await;
        a.send_raw(&[0x00, 0x03, 0x00, 0x0C, 0x01]).await;
        // Movement with a truncated payload fails in the handler
        a.send_raw(&[0x00, 0x04, 0x00, 0x0B, 0x01, 0x02]).await;
        a.send_position(Position::new(7.0, 8.0, 9.0)).await;

        let position = b.next_position(RECV_TIMEOUT).await.unwrap();
        assert_eq!(position, Position::new(7.0, 8.0, 9.0));
        assert!(b.next_frame(QUIET_PERIOD).await.is_none());
        assert_eq!(server.zone_size(), 2);

        server.stop().await;
    }

    #[tokio::test]
    async fn malformed_frame_closes_connection_under_disconnect_policy() {
        let server = TestServer::start(MalformedFramePolicy::Disconnect).await;
        let mut a = TestClient::connect(server.addr).await;
        server.wait_for_zone_size(1).await;

        a.send_raw(&[0x00, 0x03, 0xFF, 0xFF, 0x01]).await;
        assert!(a.closed_within(RECV_TIMEOUT).await);
        server.wait_for_zone_size(0).await;

        server.stop().await;
    }
}

/// LIFECYCLE TESTS
mod lifecycle_tests {
    use super::*;

    /// A client that disconnects leaves its zone and gets no more traffic
    #[tokio::test]
    async fn disconnect_leaves_zone() {
        let server = TestServer::start(MalformedFramePolicy::Log).await;
        let mut a = TestClient::connect(server.addr).await;
        let b = TestClient::connect(server.addr).await;
        server.wait_for_zone_size(2).await;

        drop(b);
        server.wait_for_zone_size(1).await;

        // Relaying to nobody is fine
        a.send_position(Position::new(0.0, 0.0, 0.0)).await;
        assert!(a.next_frame(QUIET_PERIOD).await.is_none());

        server.stop().await;
    }

    /// A peer that never reads cannot hold the server open on stop
    #[tokio::test]
    async fn shutdown_completes_with_stalled_reader() {
        let server = TestServer::start(MalformedFramePolicy::Log).await;

        // A keeps a tiny receive window and never reads
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.set_recv_buffer_size(4096).unwrap();
        let _stalled = socket.connect(server.addr).await.unwrap();
        let mut b = TestClient::connect(server.addr).await;
        server.wait_for_zone_size(2).await;

        // Every movement from B is relayed to A until the server's send
        // buffer towards A is full
        let frame = encode_frame(&Position::new(1.0, 2.0, 3.0).to_packet(Opcode::CsMove)).unwrap();
        let burst: Vec<u8> = (0..4096).flat_map(|_| frame.iter().copied()).collect();
        let flood = tokio::spawn(async move {
            for _ in 0..150 {
                if b.stream.write_all(&burst).await.is_err() {
                    break;
                }
            }
        });
        sleep(Duration::from_secs(2)).await;

        server.context.shutdown().trigger();
        let stopped = timeout(Duration::from_secs(5), server.network).await;
        flood.abort();

        let result = stopped.expect("network layer did not stop with a stalled reader");
        result.unwrap().unwrap();
        server.pool_thread.join().unwrap();
    }

    /// Stopping closes every open connection
    #[tokio::test]
    async fn shutdown_closes_open_connections() {
        let server = TestServer::start(MalformedFramePolicy::Log).await;
        let mut a = TestClient::connect(server.addr).await;
        server.wait_for_zone_size(1).await;

        server.stop().await;
        assert!(a.closed_within(RECV_TIMEOUT).await);
    }
}
