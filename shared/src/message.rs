//! Messages of the game and directory protocols
//!
//! Every datagram is `[4-byte protocol id][1-byte type tag][payload]`.
//! `Message::encode` writes the whole datagram; the per-tag decoders below
//! read only the payload and are registered with a `Demultiplexer`.

use crate::attribute::Vector2;
use crate::change_set::ReplicatedChanges;
use crate::codec::{WireReader, WireWriter};
use crate::error::CodecError;
use crate::protocol::{directory, game, Protocol, HEADER_LEN, MAX_USERNAME_LEN};
use log::warn;
use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Bytes a gamestate datagram spends before its change set
pub const GAMESTATE_HEADER_LEN: usize = HEADER_LEN + 12;

/// Actions a player can hold down
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlayerAction {
    WalkLeft,
    WalkRight,
    Jump,
    ShootPrimary,
    ShootSecondary,
    NextWeapon,
    PreviousWeapon,
}

impl PlayerAction {
    pub const fn code(self) -> u16 {
        match self {
            PlayerAction::WalkLeft => 1,
            PlayerAction::WalkRight => 2,
            PlayerAction::Jump => 3,
            PlayerAction::ShootPrimary => 4,
            PlayerAction::ShootSecondary => 5,
            PlayerAction::NextWeapon => 6,
            PlayerAction::PreviousWeapon => 7,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(PlayerAction::WalkLeft),
            2 => Some(PlayerAction::WalkRight),
            3 => Some(PlayerAction::Jump),
            4 => Some(PlayerAction::ShootPrimary),
            5 => Some(PlayerAction::ShootSecondary),
            6 => Some(PlayerAction::NextWeapon),
            7 => Some(PlayerAction::PreviousWeapon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Team {
    #[default]
    Unselected,
    Red,
    Blue,
}

impl Team {
    pub const fn code(self) -> i32 {
        match self {
            Team::Unselected => 0,
            Team::Red => 1,
            Team::Blue => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Team::Unselected),
            1 => Some(Team::Red),
            2 => Some(Team::Blue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameMode {
    #[default]
    Deathmatch,
    TeamDeathmatch,
    WalledIn,
    BridgeBuilder,
}

impl GameMode {
    pub const fn code(self) -> i32 {
        match self {
            GameMode::Deathmatch => 0,
            GameMode::TeamDeathmatch => 1,
            GameMode::WalledIn => 2,
            GameMode::BridgeBuilder => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(GameMode::Deathmatch),
            1 => Some(GameMode::TeamDeathmatch),
            2 => Some(GameMode::WalledIn),
            3 => Some(GameMode::BridgeBuilder),
            _ => None,
        }
    }
}

/// Client input for one frame, plus the last version it applied
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputMessage {
    pub version: u32,
    pub actions: BTreeSet<PlayerAction>,
    pub cursor: Vector2,
}

/// One part of a delta from `known_client_version` to `current_version`
#[derive(Debug, Clone, PartialEq)]
pub struct GamestateMessage {
    pub known_client_version: u32,
    pub current_version: u32,
    pub part: u16,
    pub part_count: u16,
    pub changes: ReplicatedChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub entity_name: String,
    pub player_name: String,
    pub team: Team,
}

/// A game server as listed by the directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerData {
    pub address: SocketAddrV4,
    pub name: String,
    pub players: u32,
    pub max_players: u32,
    pub game_mode: GameMode,
}

impl ServerData {
    /// Replaces an unspecified announced ip with the one the datagram came from
    pub fn with_source(mut self, source: SocketAddr) -> Self {
        if self.address.ip().is_unspecified() {
            if let SocketAddr::V4(source) = source {
                self.address = SocketAddrV4::new(*source.ip(), self.address.port());
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Login { username: String },
    LoginResponse { player_entity: String },
    Logout,
    Input(InputMessage),
    Gamestate(GamestateMessage),
    TeamSelect { team: Team },
    GetPlayerInfo,
    GetPlayerInfoResponse { players: Vec<PlayerInfo> },
    Alive,
    GetServers,
    Servers { servers: Vec<ServerData> },
    ServerNotification { server: ServerData },
    ServerNotificationResponse { challenge: u64 },
    ChallengeResponse { challenge: u64 },
}

impl Message {
    pub fn protocol(&self) -> Protocol {
        match self {
            Message::GetServers
            | Message::Servers { .. }
            | Message::ServerNotification { .. }
            | Message::ServerNotificationResponse { .. }
            | Message::ChallengeResponse { .. } => Protocol::Directory,
            _ => Protocol::Game,
        }
    }

    pub fn tag(&self) -> u8 {
        match self {
            Message::Login { .. } => game::LOGIN,
            Message::LoginResponse { .. } => game::LOGIN_RESPONSE,
            Message::Logout => game::LOGOUT,
            Message::Input(_) => game::INPUT,
            Message::Gamestate(_) => game::GAMESTATE,
            Message::TeamSelect { .. } => game::TEAM_SELECT,
            Message::GetPlayerInfo => game::GET_PLAYER_INFO,
            Message::GetPlayerInfoResponse { .. } => game::GET_PLAYER_INFO_RESPONSE,
            Message::Alive => game::ALIVE,
            Message::GetServers => directory::GET_SERVERS,
            Message::Servers { .. } => directory::SERVERS,
            Message::ServerNotification { .. } => directory::SERVER_NOTIFICATION,
            Message::ServerNotificationResponse { .. } => directory::SERVER_NOTIFICATION_RESPONSE,
            Message::ChallengeResponse { .. } => directory::CHALLENGE_RESPONSE,
        }
    }

    /// Writes the complete datagram
    pub fn encode(&self, writer: &mut WireWriter) -> Result<(), CodecError> {
        writer.write_u32(self.protocol().id())?;
        writer.write_u8(self.tag())?;
        match self {
            Message::Login { username } => writer.write_string(username),
            Message::LoginResponse { player_entity } => writer.write_string(player_entity),
            Message::Logout | Message::GetPlayerInfo | Message::Alive | Message::GetServers => {
                Ok(())
            }
            Message::Input(input) => {
                writer.write_u32(input.version)?;
                writer.write_count(input.actions.len())?;
                for action in &input.actions {
                    writer.write_u16(action.code())?;
                }
                writer.write_vector2(input.cursor)
            }
            Message::Gamestate(gamestate) => {
                writer.write_u32(gamestate.known_client_version)?;
                writer.write_u32(gamestate.current_version)?;
                writer.write_u16(gamestate.part)?;
                writer.write_u16(gamestate.part_count)?;
                writer.write_changes(&gamestate.changes)
            }
            Message::TeamSelect { team } => writer.write_i32(team.code()),
            Message::GetPlayerInfoResponse { players } => {
                writer.write_count(players.len())?;
                for player in players {
                    writer.write_string(&player.entity_name)?;
                    writer.write_string(&player.player_name)?;
                    writer.write_i32(player.team.code())?;
                }
                Ok(())
            }
            Message::Servers { servers } => {
                writer.write_count(servers.len())?;
                for server in servers {
                    write_server_data(writer, server)?;
                }
                Ok(())
            }
            Message::ServerNotification { server } => write_server_data(writer, server),
            Message::ServerNotificationResponse { challenge }
            | Message::ChallengeResponse { challenge } => writer.write_u64(*challenge),
        }
    }

    pub fn to_bytes(&self, capacity: usize) -> Result<Vec<u8>, CodecError> {
        let mut writer = WireWriter::new(capacity);
        self.encode(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

fn write_server_data(writer: &mut WireWriter, server: &ServerData) -> Result<(), CodecError> {
    writer.write_bytes(&server.address.ip().octets())?;
    writer.write_u32(u32::from(server.address.port()))?;
    writer.write_string(&server.name)?;
    writer.write_u32(server.players)?;
    writer.write_u32(server.max_players)?;
    writer.write_i32(server.game_mode.code())
}

fn read_server_data(reader: &mut WireReader<'_>) -> Result<ServerData, CodecError> {
    let octets = reader.read_bytes(4)?;
    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = reader.read_u32()?;
    let port = u16::try_from(port).map_err(|_| CodecError::UnknownCode {
        kind: "port",
        code: i64::from(port),
    })?;
    let name = reader.read_string()?;
    let players = reader.read_u32()?;
    let max_players = reader.read_u32()?;
    let mode = reader.read_i32()?;
    let game_mode = GameMode::from_code(mode).ok_or(CodecError::UnknownCode {
        kind: "game mode",
        code: i64::from(mode),
    })?;
    Ok(ServerData {
        address: SocketAddrV4::new(ip, port),
        name,
        players,
        max_players,
        game_mode,
    })
}

fn read_team(reader: &mut WireReader<'_>) -> Result<Team, CodecError> {
    let code = reader.read_i32()?;
    Team::from_code(code).ok_or(CodecError::UnknownCode {
        kind: "team",
        code: i64::from(code),
    })
}

/// Reads a message payload; the header has already been consumed
pub type Decoder = fn(&mut WireReader<'_>) -> Result<Message, CodecError>;

fn decode_login(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    let username = reader.read_string()?;
    if username.len() > MAX_USERNAME_LEN {
        return Err(CodecError::FieldTooLong {
            field: "username",
            len: username.len(),
            max: MAX_USERNAME_LEN,
        });
    }
    Ok(Message::Login { username })
}

fn decode_login_response(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::LoginResponse {
        player_entity: reader.read_string()?,
    })
}

fn decode_logout(_: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::Logout)
}

fn decode_input(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    let version = reader.read_u32()?;
    let count = reader.read_count(2)?;
    let mut actions = BTreeSet::new();
    for _ in 0..count {
        let code = reader.read_u16()?;
        match PlayerAction::from_code(code) {
            Some(action) => {
                actions.insert(action);
            }
            None => warn!("Skipping unknown player action {}", code),
        }
    }
    let cursor = reader.read_vector2()?;
    Ok(Message::Input(InputMessage {
        version,
        actions,
        cursor,
    }))
}

fn decode_gamestate(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::Gamestate(GamestateMessage {
        known_client_version: reader.read_u32()?,
        current_version: reader.read_u32()?,
        part: reader.read_u16()?,
        part_count: reader.read_u16()?,
        changes: reader.read_changes()?,
    }))
}

fn decode_team_select(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::TeamSelect {
        team: read_team(reader)?,
    })
}

fn decode_get_player_info(_: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::GetPlayerInfo)
}

fn decode_get_player_info_response(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    let count = reader.read_count(12)?;
    let mut players = Vec::new();
    for _ in 0..count {
        players.push(PlayerInfo {
            entity_name: reader.read_string()?,
            player_name: reader.read_string()?,
            team: read_team(reader)?,
        });
    }
    Ok(Message::GetPlayerInfoResponse { players })
}

fn decode_alive(_: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::Alive)
}

fn decode_get_servers(_: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::GetServers)
}

fn decode_servers(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    let count = reader.read_count(24)?;
    let servers = (0..count)
        .map(|_| read_server_data(reader))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Message::Servers { servers })
}

fn decode_server_notification(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::ServerNotification {
        server: read_server_data(reader)?,
    })
}

fn decode_server_notification_response(
    reader: &mut WireReader<'_>,
) -> Result<Message, CodecError> {
    Ok(Message::ServerNotificationResponse {
        challenge: reader.read_u64()?,
    })
}

fn decode_challenge_response(reader: &mut WireReader<'_>) -> Result<Message, CodecError> {
    Ok(Message::ChallengeResponse {
        challenge: reader.read_u64()?,
    })
}

/// Decoders for every game protocol tag
pub fn game_decoders() -> [(u8, Decoder); 9] {
    [
        (game::LOGIN, decode_login),
        (game::LOGIN_RESPONSE, decode_login_response),
        (game::LOGOUT, decode_logout),
        (game::INPUT, decode_input),
        (game::GAMESTATE, decode_gamestate),
        (game::TEAM_SELECT, decode_team_select),
        (game::GET_PLAYER_INFO, decode_get_player_info),
        (game::GET_PLAYER_INFO_RESPONSE, decode_get_player_info_response),
        (game::ALIVE, decode_alive),
    ]
}

/// Decoders for every directory protocol tag
pub fn directory_decoders() -> [(u8, Decoder); 5] {
    [
        (directory::GET_SERVERS, decode_get_servers),
        (directory::SERVERS, decode_servers),
        (directory::SERVER_NOTIFICATION, decode_server_notification),
        (
            directory::SERVER_NOTIFICATION_RESPONSE,
            decode_server_notification_response,
        ),
        (directory::CHALLENGE_RESPONSE, decode_challenge_response),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let bytes = Message::Logout.to_bytes(64).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[..4], &crate::protocol::GAME_PROTOCOL_ID.to_be_bytes());
        assert_eq!(bytes[4], game::LOGOUT);

        let bytes = Message::GetServers.to_bytes(64).unwrap();
        assert_eq!(
            &bytes[..4],
            &crate::protocol::DIRECTORY_PROTOCOL_ID.to_be_bytes()
        );
    }

    #[test]
    fn test_overlong_username_rejected() {
        let longest = "x".repeat(MAX_USERNAME_LEN);
        let mut writer = WireWriter::new(256);
        writer.write_string(&longest).unwrap();
        let mut reader = WireReader::new(writer.as_bytes());
        assert_eq!(
            decode_login(&mut reader),
            Ok(Message::Login { username: longest })
        );

        let mut writer = WireWriter::new(256);
        writer.write_string(&"x".repeat(MAX_USERNAME_LEN + 1)).unwrap();
        let mut reader = WireReader::new(writer.as_bytes());
        assert!(matches!(
            decode_login(&mut reader),
            Err(CodecError::FieldTooLong { field: "username", .. })
        ));
    }

    #[test]
    fn test_gamestate_header_len() {
        let message = Message::Gamestate(GamestateMessage {
            known_client_version: 1,
            current_version: 2,
            part: 0,
            part_count: 1,
            changes: ReplicatedChanges::default(),
        });
        let bytes = message.to_bytes(256).unwrap();
        assert_eq!(
            bytes.len(),
            GAMESTATE_HEADER_LEN + crate::codec::CHANGES_HEADER_LEN
        );
    }

    #[test]
    fn test_input_skips_unknown_action() {
        let mut writer = WireWriter::default();
        writer.write_u32(9).unwrap();
        writer.write_count(2).unwrap();
        writer.write_u16(PlayerAction::Jump.code()).unwrap();
        writer.write_u16(999).unwrap();
        writer.write_vector2(Vector2::new(3.0, 4.0)).unwrap();

        let mut reader = WireReader::new(writer.as_bytes());
        let message = decode_input(&mut reader).unwrap();
        let Message::Input(input) = message else {
            panic!("Wrong message type after decoding");
        };
        assert_eq!(input.version, 9);
        assert_eq!(input.actions.len(), 1);
        assert!(input.actions.contains(&PlayerAction::Jump));
        assert_eq!(input.cursor, Vector2::new(3.0, 4.0));
    }

    #[test]
    fn test_server_data_with_source() {
        let server = ServerData {
            address: "0.0.0.0:1234".parse().unwrap(),
            name: "test".into(),
            players: 0,
            max_players: 8,
            game_mode: GameMode::Deathmatch,
        };
        let source: SocketAddr = "10.0.0.5:5555".parse().unwrap();
        let server = server.with_source(source);
        assert_eq!(server.address, "10.0.0.5:1234".parse().unwrap());
    }

    #[test]
    fn test_codes_roundtrip() {
        for team in [Team::Unselected, Team::Red, Team::Blue] {
            assert_eq!(Team::from_code(team.code()), Some(team));
        }
        for mode in [
            GameMode::Deathmatch,
            GameMode::TeamDeathmatch,
            GameMode::WalledIn,
            GameMode::BridgeBuilder,
        ] {
            assert_eq!(GameMode::from_code(mode.code()), Some(mode));
        }
        assert_eq!(Team::from_code(42), None);
        assert_eq!(PlayerAction::from_code(0), None);
    }
}
