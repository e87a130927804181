use clap::Parser;
use log::{error, info};
use server::{MalformedFramePolicy, Server, ServerConfig};
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// Command line arguments; each flag overrides the config file
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Server IP address to bind to
    #[arg(short = 'H', long)]
    host: Option<IpAddr>,
    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Zone ticks per second
    #[arg(short, long)]
    tick_rate: Option<u32>,
    /// What to do with malformed frames
    #[arg(long, value_enum)]
    malformed_frames: Option<MalformedFramePolicy>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
        if let Some(policy) = self.malformed_frames {
            config.malformed_frames = policy;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init()?;

    let config = Args::parse().into_config()?;
    info!(
        "Starting server on {} at {} ticks per second",
        config.bind_addr(),
        config.tick_rate
    );

    let server = Arc::new(Server::new(config)?);
    spawn_signal_watcher(Arc::clone(&server))?;

    server.run()?;
    Ok(())
}

/// Stops the server on Ctrl+C
fn spawn_signal_watcher(server: Arc<Server>) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            let received = runtime.block_on(tokio::signal::ctrl_c());
            match received {
                Ok(()) => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                    server.stop();
                }
                Err(e) => error!("Unable to listen for shutdown signal: {}", e),
            }
        })?;
    Ok(())
}
