//! # Game Server Library
//!
//! The authoritative side of the replication protocol. The server owns the
//! canonical world, runs the game rules at a fixed tick rate, and sends each
//! connected client the changes it has not yet acknowledged.
//!
//! ## Tick
//!
//! Each tick runs, in order:
//! 1. every datagram queued since the previous tick is applied (logins,
//!    inputs, acknowledgements, logouts)
//! 2. the game rules advance the world from the latest player inputs
//! 3. liveness is polled; dead connections are purged and their players
//!    removed
//! 4. the tick's registry mutations are committed as a new version
//! 5. every connection gets the delta from its acknowledged version, split
//!    into as many gamestate datagrams as the buffer size requires
//!
//! A client whose acknowledged version has fallen out of the retained
//! history gets the whole world instead of a delta.
//!
//! ## Module Organization
//!
//! - `client_manager`: per-address connections and the liveness state machine
//! - `config`: server and directory configuration
//! - `directory`: the directory server listing running game servers
//! - `game`: the game rules mutating the registry
//! - `network`: UDP tasks and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "127.0.0.1:1234".to_string(),
//!         ..Default::default()
//!     };
//!     let mut server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod directory;
pub mod game;
pub mod network;
