use clap::Parser;
use client::input::{InputManager, InputMode};
use client::network::{Client, ClientConfig};
use log::{info, warn};
use shared::{Image, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server reliable channel port
    #[arg(short = 't', long, default_value_t = DEFAULT_TCP_PORT)]
    tcp_port: u16,

    /// Server datagram port
    #[arg(short = 'u', long, default_value_t = DEFAULT_UDP_PORT)]
    udp_port: u16,

    /// Own vehicle texture (binary PPM); the server default is used otherwise
    #[arg(long)]
    texture: Option<PathBuf>,

    /// Steering force in [-1, 1]
    #[arg(short = 'r', long, default_value = "0.0", allow_negative_numbers = true)]
    rotational: f32,

    /// Throttle force in [-1, 1]
    #[arg(short = 'f', long, default_value = "1.0", allow_negative_numbers = true)]
    translational: f32,

    /// Randomly wander instead of steering with a constant force
    #[arg(short = 'w', long)]
    wander: bool,

    /// Milliseconds between two vehicle updates
    #[arg(long, default_value = "16")]
    send_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let texture = match &args.texture {
        Some(path) => Some(Image::load(path)?),
        None => None,
    };
    let mode = if args.wander {
        InputMode::Wander
    } else {
        InputMode::Constant
    };
    let config = ClientConfig {
        host: args.host,
        tcp_port: args.tcp_port,
        udp_port: args.udp_port,
        send_interval: Duration::from_millis(args.send_interval_ms.max(1)),
    };

    info!("Starting client...");
    let input_manager = InputManager::new(mode, args.rotational, args.translational);
    let mut client = Client::connect(&config, texture, input_manager).await?;

    tokio::select! {
        result = client.run() => {
            if let Err(e) = result {
                warn!("Client stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, leaving the game");
        }
    }

    Ok(())
}
