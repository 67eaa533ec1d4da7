use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use shared::message::GameMode;
use shared::protocol::{DEFAULT_GAME_PORT, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_GAME_PORT)]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "30")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Size of every datagram buffer in bytes
    #[arg(long, default_value = "16384")]
    buffer_size: usize,

    /// Number of versions kept for delta computation
    #[arg(long, default_value = "256")]
    history_len: usize,

    /// Milliseconds between liveness probes
    #[arg(long, default_value = "1000")]
    check_interval_ms: u64,

    /// Milliseconds a probe may stay unanswered
    #[arg(long, default_value = "1000")]
    wait_interval_ms: u64,

    /// Name shown in server lists
    #[arg(short, long, default_value = "Walled In server")]
    name: String,

    /// Game mode: deathmatch, team-deathmatch, walled-in or bridge-builder
    #[arg(short, long, default_value = "deathmatch", value_parser = parse_game_mode)]
    game_mode: GameMode,

    /// Directory server to announce to
    #[arg(short, long)]
    directory: Option<SocketAddr>,
}

fn parse_game_mode(value: &str) -> Result<GameMode, String> {
    match value {
        "deathmatch" => Ok(GameMode::Deathmatch),
        "team-deathmatch" => Ok(GameMode::TeamDeathmatch),
        "walled-in" => Ok(GameMode::WalledIn),
        "bridge-builder" => Ok(GameMode::BridgeBuilder),
        other => Err(format!("unknown game mode {}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_duration: Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32),
        max_clients: args.max_clients,
        buffer_size: args.buffer_size.min(MAX_DATAGRAM_SIZE),
        history_len: args.history_len,
        check_interval: Duration::from_millis(args.check_interval_ms),
        wait_interval: Duration::from_millis(args.wait_interval_ms),
        name: args.name,
        game_mode: args.game_mode,
        directory: args.directory,
        ..Default::default()
    };

    info!("Starting server...");
    info!("Tick rate: {} Hz, max clients: {}", args.tick_rate, config.max_clients);

    let mut server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
