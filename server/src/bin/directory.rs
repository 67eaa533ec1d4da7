use clap::Parser;
use log::info;
use server::config::DirectoryConfig;
use server::directory::DirectoryServer;
use shared::protocol::DEFAULT_DIRECTORY_PORT;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Directory (master) server for game servers", long_about = None)]
struct Args {
    /// IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_DIRECTORY_PORT)]
    port: u16,

    /// Seconds after which a silent server is dropped from the list
    #[arg(short, long, default_value = "15")]
    server_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = DirectoryConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        server_timeout: Duration::from_secs(args.server_timeout),
        ..Default::default()
    };

    info!("Starting directory server...");
    let mut directory = DirectoryServer::new(config).await?;

    tokio::select! {
        result = directory.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
