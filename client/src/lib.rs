//! # Game Client Library
//!
//! The replicating side of the protocol. The client logs in, holds a local
//! copy of the server's world in an untracked `Registry`, and keeps it in
//! step by applying gamestate deltas. Every input message it sends carries
//! the last version it fully applied, which the server uses as the baseline
//! of the next delta.
//!
//! ## Module Organization
//!
//! - `input`: held actions and the input send schedule
//! - `network`: the UDP loop, login and logout, server list queries
//! - `sync`: version bookkeeping and application of gamestate parts
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use shared::PlayerAction;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:1234", "alice").await?;
//!     client.input_manager().press(PlayerAction::WalkRight);
//!     client.run_for(Duration::from_secs(5)).await?;
//!     println!("{} entities replicated", client.registry().len());
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
pub mod sync;
