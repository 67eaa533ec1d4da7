//! Runtime configuration for the game server and the directory server

use shared::message::GameMode;
use shared::protocol::{
    DEFAULT_BUFFER_SIZE, DEFAULT_DIRECTORY_PORT, DEFAULT_GAME_PORT, LIVENESS_CHECK_INTERVAL,
    LIVENESS_WAIT_INTERVAL,
};
use shared::tracker::DEFAULT_HISTORY_LEN;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the game socket binds to
    pub bind_addr: String,
    pub tick_duration: Duration,
    pub max_clients: usize,
    /// Upper bound on every encoded datagram
    pub buffer_size: usize,
    /// Versions of change history kept for delta computation
    pub history_len: usize,
    pub check_interval: Duration,
    pub wait_interval: Duration,
    /// Name advertised to the directory
    pub name: String,
    pub game_mode: GameMode,
    /// Directory server to announce to, if any
    pub directory: Option<SocketAddr>,
    pub announce_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_GAME_PORT),
            tick_duration: Duration::from_millis(33),
            max_clients: 16,
            buffer_size: DEFAULT_BUFFER_SIZE,
            history_len: DEFAULT_HISTORY_LEN,
            check_interval: LIVENESS_CHECK_INTERVAL,
            wait_interval: LIVENESS_WAIT_INTERVAL,
            name: "Walled In server".to_string(),
            game_mode: GameMode::Deathmatch,
            directory: None,
            announce_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub bind_addr: String,
    /// Servers that have not announced for this long are dropped from the list
    pub server_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_DIRECTORY_PORT),
            server_timeout: Duration::from_secs(15),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}
