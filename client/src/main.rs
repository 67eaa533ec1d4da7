use clap::Parser;
use client::network::{self, Client};
use log::info;
use shared::message::{PlayerAction, Team};
use shared::protocol::DEFAULT_DIRECTORY_PORT;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:1234")]
    server: String,

    /// Player name
    #[arg(short, long, default_value = "player")]
    username: String,

    /// Team to join: red or blue
    #[arg(short, long, value_parser = parse_team)]
    team: Option<Team>,

    /// Actions to hold down, e.g. walk-right,jump
    #[arg(short, long, value_delimiter = ',', value_parser = parse_action)]
    actions: Vec<PlayerAction>,

    /// Print the server's player list after logging in
    #[arg(short, long)]
    player_info: bool,

    /// Seconds to stay connected; runs until Ctrl+C when omitted
    #[arg(long)]
    duration: Option<u64>,

    /// List the servers known to this directory instead of connecting
    #[arg(short, long)]
    list_servers: Option<String>,
}

fn parse_team(value: &str) -> Result<Team, String> {
    match value {
        "red" => Ok(Team::Red),
        "blue" => Ok(Team::Blue),
        other => Err(format!("unknown team {}", other)),
    }
}

fn parse_action(value: &str) -> Result<PlayerAction, String> {
    match value {
        "walk-left" => Ok(PlayerAction::WalkLeft),
        "walk-right" => Ok(PlayerAction::WalkRight),
        "jump" => Ok(PlayerAction::Jump),
        "shoot" => Ok(PlayerAction::ShootPrimary),
        "shoot-secondary" => Ok(PlayerAction::ShootSecondary),
        "next-weapon" => Ok(PlayerAction::NextWeapon),
        "previous-weapon" => Ok(PlayerAction::PreviousWeapon),
        other => Err(format!("unknown action {}", other)),
    }
}

async fn list_servers(directory: &str) -> Result<(), Box<dyn std::error::Error>> {
    let directory = if directory.contains(':') {
        directory.to_string()
    } else {
        format!("{}:{}", directory, DEFAULT_DIRECTORY_PORT)
    };

    let servers = network::query_servers(&directory, Duration::from_secs(3)).await?;
    if servers.is_empty() {
        println!("No servers listed");
    }
    for server in servers {
        println!(
            "{:<24} {:<32} {}/{} {:?}",
            server.address, server.name, server.players, server.max_players, server.game_mode
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    if let Some(directory) = args.list_servers {
        return list_servers(&directory).await;
    }

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(&args.server, &args.username).await?;
    if let Some(team) = args.team {
        client = client.with_team(team);
    }
    if args.player_info {
        client = client.with_player_info();
    }
    for action in args.actions {
        client.input_manager().press(action);
    }

    match args.duration {
        Some(secs) => client.run_for(Duration::from_secs(secs)).await?,
        None => {
            tokio::select! {
                result = client.run() => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                }
            }
            client.disconnect().await?;
        }
    }

    Ok(())
}
