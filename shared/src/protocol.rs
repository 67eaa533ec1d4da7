//! Protocol identifiers, message tags, and network constants

use std::time::Duration;

/// Leading identifier of every game protocol datagram
pub const GAME_PROTOCOL_ID: u32 = 0x574C_4447;
/// Leading identifier of every directory (master server) datagram
pub const DIRECTORY_PROTOCOL_ID: u32 = 0x574C_444D;

/// Protocol identifier plus message type tag
pub const HEADER_LEN: usize = 5;

/// Default size of every encode/decode buffer
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;
/// Largest payload a single UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Longest player name, in bytes, a login may carry
pub const MAX_USERNAME_LEN: usize = 32;

pub const DEFAULT_GAME_PORT: u16 = 1234;
pub const DEFAULT_DIRECTORY_PORT: u16 = 1235;

/// Time between liveness probes to a connected client
pub const LIVENESS_CHECK_INTERVAL: Duration = Duration::from_millis(1000);
/// Time a probe may stay unanswered before the client is declared dead
pub const LIVENESS_WAIT_INTERVAL: Duration = Duration::from_millis(1000);

/// The two protocols sharing a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Game,
    Directory,
}

impl Protocol {
    pub const fn id(self) -> u32 {
        match self {
            Protocol::Game => GAME_PROTOCOL_ID,
            Protocol::Directory => DIRECTORY_PROTOCOL_ID,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            GAME_PROTOCOL_ID => Some(Protocol::Game),
            DIRECTORY_PROTOCOL_ID => Some(Protocol::Directory),
            _ => None,
        }
    }
}

/// Message type tags of the game protocol
pub mod game {
    pub const LOGIN: u8 = 0;
    pub const LOGIN_RESPONSE: u8 = 1;
    pub const LOGOUT: u8 = 2;
    pub const INPUT: u8 = 3;
    pub const GAMESTATE: u8 = 4;
    pub const TEAM_SELECT: u8 = 5;
    pub const GET_PLAYER_INFO: u8 = 6;
    pub const GET_PLAYER_INFO_RESPONSE: u8 = 7;
    pub const ALIVE: u8 = 8;
}

/// Message type tags of the directory protocol
pub mod directory {
    pub const GET_SERVERS: u8 = 0;
    pub const SERVERS: u8 = 1;
    pub const SERVER_NOTIFICATION: u8 = 2;
    pub const SERVER_NOTIFICATION_RESPONSE: u8 = 3;
    pub const CHALLENGE_RESPONSE: u8 = 4;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_ids_are_disjoint() {
        assert_ne!(GAME_PROTOCOL_ID, DIRECTORY_PROTOCOL_ID);
        assert_eq!(Protocol::from_id(GAME_PROTOCOL_ID), Some(Protocol::Game));
        assert_eq!(
            Protocol::from_id(DIRECTORY_PROTOCOL_ID),
            Some(Protocol::Directory)
        );
        assert_eq!(Protocol::from_id(0xDEAD_BEEF), None);
    }

    #[test]
    fn test_buffer_bounds() {
        assert!(DEFAULT_BUFFER_SIZE <= MAX_DATAGRAM_SIZE);
        assert!(DEFAULT_BUFFER_SIZE >= 1024);
    }
}
