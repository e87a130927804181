//! Load generator: opens several connections, sends random movement and
//! counts the position updates relayed back by the server

use clap::Parser;
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{encode_frame, split_body, FrameParser, Opcode, Position};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::sleep;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:40000")]
    server: String,
    /// Number of simultaneous clients
    #[arg(short, long, default_value = "3")]
    clients: usize,
    /// Movement packets sent by each client
    #[arg(short, long, default_value = "20")]
    moves: u32,
    /// Delay between two movement packets in milliseconds
    #[arg(short, long, default_value = "100")]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut handles = Vec::with_capacity(args.clients);
    for id in 0..args.clients {
        let server = args.server.clone();
        let moves = args.moves;
        let interval = Duration::from_millis(args.interval_ms);
        handles.push(tokio::spawn(async move {
            run_client(id, server, moves, interval).await
        }));
    }

    for (id, handle) in handles.into_iter().enumerate() {
        match handle.await? {
            Ok(received) => info!("Client {} received {} position updates", id, received),
            Err(e) => error!("Client {} failed: {}", id, e),
        }
    }
    Ok(())
}

async fn run_client(
    id: usize,
    server: String,
    moves: u32,
    interval: Duration,
) -> Result<usize, BoxError> {
    let stream = TcpStream::connect(&server).await?;
    stream.set_nodelay(true)?;
    info!("Client {} connected to {}", id, server);

    let (mut reader, mut writer) = stream.into_split();

    let receiver = tokio::spawn(async move {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; 2048];
        let mut received = 0usize;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            parser.feed(&buf[..n], |body| {
                let Some((opcode, payload)) = split_body(body) else {
                    return;
                };
                if opcode != Opcode::ScMove.as_u16() {
                    return;
                }
                let mut cursor = shared::ByteReader::new(payload);
                if let Ok(position) = Position::read_from(&mut cursor) {
                    debug!(
                        "Client {} saw a player at ({:.1}, {:.1}, {:.1})",
                        id, position.x, position.y, position.z
                    );
                    received += 1;
                }
            });
        }
        received
    });

    let mut rng = StdRng::from_entropy();
    for _ in 0..moves {
        let position = Position::new(
            rng.gen_range(-100.0..100.0),
            rng.gen_range(-100.0..100.0),
            rng.gen_range(0.0..10.0),
        );
        let frame = encode_frame(&position.to_packet(Opcode::CsMove))?;
        writer.write_all(&frame).await?;
        sleep(interval).await;
    }

    // Let the last updates from other clients arrive
    sleep(Duration::from_millis(500)).await;
    writer.shutdown().await?;
    drop(writer);

    let received = tokio::time::timeout(Duration::from_secs(5), receiver).await??;
    Ok(received)
}
