//! Routing of raw datagrams to message decoders
//!
//! A datagram is routed by its protocol id and type tag. Anything that does
//! not route, or whose payload does not decode, comes back as an error for
//! the caller to log and drop.

use crate::codec::WireReader;
use crate::error::CodecError;
use crate::message::{self, Decoder, Message};
use crate::protocol::Protocol;
use log::trace;
use std::collections::HashMap;

#[derive(Default)]
pub struct Demultiplexer {
    decoders: HashMap<(Protocol, u8), Decoder>,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything a game server or game client understands
    pub fn game() -> Self {
        let mut demux = Self::new();
        demux.register_game();
        demux
    }

    /// Everything a directory server understands
    pub fn directory() -> Self {
        let mut demux = Self::new();
        demux.register_directory();
        demux
    }

    /// Both protocols; a game server also talks to the directory
    pub fn all() -> Self {
        let mut demux = Self::new();
        demux.register_game();
        demux.register_directory();
        demux
    }

    pub fn register(&mut self, protocol: Protocol, tag: u8, decoder: Decoder) {
        self.decoders.insert((protocol, tag), decoder);
    }

    fn register_game(&mut self) {
        for (tag, decoder) in message::game_decoders() {
            self.register(Protocol::Game, tag, decoder);
        }
    }

    fn register_directory(&mut self) {
        for (tag, decoder) in message::directory_decoders() {
            self.register(Protocol::Directory, tag, decoder);
        }
    }

    pub fn decode(&self, datagram: &[u8]) -> Result<Message, CodecError> {
        let mut reader = WireReader::new(datagram);
        let id = reader.read_u32()?;
        let protocol = Protocol::from_id(id).ok_or(CodecError::UnknownProtocol(id))?;
        let tag = reader.read_u8()?;
        let decoder = self
            .decoders
            .get(&(protocol, tag))
            .ok_or(CodecError::UnknownMessageType { protocol: id, tag })?;

        let message = decoder(&mut reader)?;
        if reader.remaining() > 0 {
            trace!(
                "Ignoring {} trailing bytes after {:?} message",
                reader.remaining(),
                protocol
            );
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeMap, AttributeValue, Vector2};
    use crate::change_set::ReplicatedChanges;
    use crate::entity::Family;
    use crate::message::{
        GameMode, GamestateMessage, InputMessage, PlayerAction, PlayerInfo, ServerData, Team,
    };
    use crate::protocol::{game, GAME_PROTOCOL_ID};

    fn roundtrip(demux: &Demultiplexer, message: Message) {
        let bytes = message.to_bytes(crate::protocol::DEFAULT_BUFFER_SIZE).unwrap();
        assert_eq!(demux.decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_game_messages() {
        let demux = Demultiplexer::game();
        roundtrip(&demux, Message::Login { username: "alice".into() });
        roundtrip(
            &demux,
            Message::LoginResponse {
                player_entity: "player_1".into(),
            },
        );
        roundtrip(&demux, Message::Logout);
        roundtrip(&demux, Message::Alive);
        roundtrip(&demux, Message::TeamSelect { team: Team::Blue });
        roundtrip(&demux, Message::GetPlayerInfo);
        roundtrip(&demux, Message::GetPlayerInfoResponse { players: vec![] });
        roundtrip(
            &demux,
            Message::GetPlayerInfoResponse {
                players: vec![
                    PlayerInfo {
                        entity_name: "player_1".into(),
                        player_name: "alice".into(),
                        team: Team::Red,
                    },
                    PlayerInfo {
                        entity_name: "player_2".into(),
                        player_name: "bob".into(),
                        team: Team::Unselected,
                    },
                ],
            },
        );

        let mut actions = std::collections::BTreeSet::new();
        actions.insert(PlayerAction::WalkLeft);
        actions.insert(PlayerAction::ShootPrimary);
        roundtrip(
            &demux,
            Message::Input(InputMessage {
                version: 3,
                actions,
                cursor: Vector2::new(10.0, -2.5),
            }),
        );
    }

    #[test]
    fn test_gamestate_message() {
        let mut changes = ReplicatedChanges {
            first_version: 3,
            last_version: 4,
            ..Default::default()
        };
        changes
            .created
            .insert("bullet_1".into(), Family::from(Family::BULLET));
        let mut values = AttributeMap::new();
        values.insert(Attribute::Position, AttributeValue::Vector2(Vector2::new(5.0, 5.0)));
        changes.updated.insert("bullet_1".into(), values);

        roundtrip(
            &Demultiplexer::game(),
            Message::Gamestate(GamestateMessage {
                known_client_version: 3,
                current_version: 4,
                part: 0,
                part_count: 1,
                changes,
            }),
        );
    }

    #[test]
    fn test_directory_messages() {
        let demux = Demultiplexer::directory();
        let server = ServerData {
            address: "192.168.1.2:1234".parse().unwrap(),
            name: "Walled In".into(),
            players: 3,
            max_players: 8,
            game_mode: GameMode::TeamDeathmatch,
        };
        roundtrip(&demux, Message::GetServers);
        roundtrip(
            &demux,
            Message::ServerNotification {
                server: server.clone(),
            },
        );
        roundtrip(
            &demux,
            Message::Servers {
                servers: vec![server],
            },
        );
        roundtrip(&demux, Message::Servers { servers: vec![] });
        roundtrip(&demux, Message::ServerNotificationResponse { challenge: 0x0123_4567_89ab_cdef });
        roundtrip(&demux, Message::ChallengeResponse { challenge: u64::MAX });
    }

    #[test]
    fn test_unknown_protocol() {
        let demux = Demultiplexer::all();
        let datagram = [0xde, 0xad, 0xbe, 0xef, game::LOGOUT];
        assert_eq!(
            demux.decode(&datagram),
            Err(CodecError::UnknownProtocol(0xdead_beef))
        );
    }

    #[test]
    fn test_unregistered_tag() {
        let demux = Demultiplexer::game();
        let bytes = Message::GetServers.to_bytes(64).unwrap();
        assert!(matches!(
            demux.decode(&bytes),
            Err(CodecError::UnknownMessageType { .. })
        ));

        let mut datagram = GAME_PROTOCOL_ID.to_be_bytes().to_vec();
        datagram.push(200);
        assert_eq!(
            demux.decode(&datagram),
            Err(CodecError::UnknownMessageType {
                protocol: GAME_PROTOCOL_ID,
                tag: 200
            })
        );
    }

    #[test]
    fn test_short_datagrams() {
        let demux = Demultiplexer::all();
        assert!(matches!(demux.decode(&[]), Err(CodecError::Truncated { .. })));
        assert!(matches!(
            demux.decode(&GAME_PROTOCOL_ID.to_be_bytes()),
            Err(CodecError::Truncated { .. })
        ));

        let bytes = Message::Login { username: "bob".into() }.to_bytes(64).unwrap();
        assert!(matches!(
            demux.decode(&bytes[..bytes.len() - 1]),
            Err(CodecError::Truncated { .. })
        ));
    }
}
