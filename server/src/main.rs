use clap::Parser;
use log::{error, info};
use server::assets::ServerAssets;
use server::config::{ServerConfig, TickMode};
use server::network::Server;
use shared::{DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interface to bind both listeners to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Reliable channel port
    #[arg(short = 't', long, default_value_t = DEFAULT_TCP_PORT)]
    tcp_port: u16,

    /// Datagram port
    #[arg(short = 'u', long, default_value_t = DEFAULT_UDP_PORT)]
    udp_port: u16,

    /// Surface elevation image (binary PPM)
    #[arg(long)]
    elevation: Option<PathBuf>,

    /// Surface texture image (binary PPM)
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Vehicle texture for clients that do not send one (binary PPM)
    #[arg(long)]
    vehicle_texture: Option<PathBuf>,

    /// Maximum number of clients (at most 511, the vehicles one snapshot datagram holds)
    #[arg(short = 'm', long, default_value = "64")]
    max_clients: usize,

    /// Maximum number of handshakes in flight
    #[arg(long, default_value = "16")]
    max_handshakes: usize,

    /// Handshake timeout in milliseconds
    #[arg(long, default_value = "5000")]
    handshake_timeout_ms: u64,

    /// Give every tick this fixed duration instead of the elapsed time
    #[arg(long)]
    fixed_tick_ms: Option<u64>,

    /// Upper bound on an elapsed-time tick
    #[arg(long, default_value = "50")]
    max_tick_ms: u64,
}

impl Args {
    fn config(&self) -> ServerConfig {
        let tick = match self.fixed_tick_ms {
            Some(ms) => TickMode::Fixed(Duration::from_millis(ms)),
            None => TickMode::Elapsed {
                max: Duration::from_millis(self.max_tick_ms),
            },
        };

        ServerConfig {
            host: self.host.clone(),
            tcp_port: self.tcp_port,
            udp_port: self.udp_port,
            max_clients: self.max_clients,
            max_handshakes: self.max_handshakes,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            tick,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config();

    info!("Starting server...");
    info!("Max clients: {}", config.max_clients);
    info!("Tick mode: {:?}", config.tick);

    let assets = ServerAssets::load(
        args.elevation.as_deref(),
        args.texture.as_deref(),
        args.vehicle_texture.as_deref(),
    )?;
    let server = Server::bind(config, assets).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
