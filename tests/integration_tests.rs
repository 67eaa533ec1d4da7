//! Integration tests for the replication protocol and the UDP services

use assert_approx_eq::assert_approx_eq;
use client::network::{query_servers, Client};
use client::sync::{SyncOutcome, SyncSession};
use server::client_manager::{Liveness, LivenessAction, ServerConnection};
use server::config::{DirectoryConfig, ServerConfig};
use server::directory::DirectoryServer;
use server::network::{build_gamestates, Server, ServerMessage};
use shared::message::GameMode;
use shared::protocol::{game, GAME_PROTOCOL_ID};
use shared::*;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Encodes a message the way the server's sender task would
fn datagram(message: &Message) -> Vec<u8> {
    message.to_bytes(protocol::DEFAULT_BUFFER_SIZE).unwrap()
}

fn bullet_delta(known: u32, current: u32) -> Message {
    let mut changes = ReplicatedChanges {
        first_version: known,
        last_version: current,
        ..Default::default()
    };
    changes
        .created
        .insert("bullet_1".to_string(), Family::from(Family::BULLET));
    let mut values = AttributeMap::new();
    values.insert(
        Attribute::Position,
        AttributeValue::Vector2(Vector2::new(5.0, 5.0)),
    );
    changes.updated.insert("bullet_1".to_string(), values);

    Message::Gamestate(GamestateMessage {
        known_client_version: known,
        current_version: current,
        part: 0,
        part_count: 1,
        changes,
    })
}

/// Client session already at `version`
fn client_at(version: u32) -> (SyncSession, Registry) {
    let mut registry = Registry::new(DefaultEntityFactory);
    let mut session = SyncSession::new();
    let empty = GamestateMessage {
        known_client_version: 0,
        current_version: version,
        part: 0,
        part_count: 1,
        changes: ReplicatedChanges::default(),
    };
    session.receive(empty, &mut registry);
    (session, registry)
}

mod protocol_tests {
    use super::*;

    #[test]
    fn test_delta_through_the_wire() {
        let (mut session, mut registry) = client_at(3);
        let demux = Demultiplexer::game();

        let bytes = datagram(&bullet_delta(3, 4));
        let Message::Gamestate(gamestate) = demux.decode(&bytes).unwrap() else {
            panic!("Expected a gamestate");
        };

        assert_eq!(
            session.receive(gamestate, &mut registry),
            SyncOutcome::Applied { version: 4 }
        );
        let bullet = registry.get("bullet_1").unwrap();
        let position = bullet.get(Attribute::Position).unwrap().as_vector().unwrap();
        assert_approx_eq!(position.x, 5.0);
        assert_approx_eq!(position.y, 5.0);

        // The next input acknowledges the applied version
        let input = Message::Input(InputMessage {
            version: session.ack_version(),
            ..Default::default()
        });
        let Message::Input(decoded) = demux.decode(&datagram(&input)).unwrap() else {
            panic!("Expected an input");
        };
        assert_eq!(decoded.version, 4);
    }

    #[test]
    fn test_baseline_mismatch_requests_resync() {
        let (mut session, mut registry) = client_at(3);
        let demux = Demultiplexer::game();

        let decoded = demux.decode(&datagram(&bullet_delta(5, 6))).unwrap();
        let Message::Gamestate(gamestate) = decoded else {
            panic!("Expected a gamestate");
        };
        assert_eq!(
            session.receive(gamestate, &mut registry),
            SyncOutcome::VersionMismatch {
                local: 3,
                baseline: 5
            }
        );
        assert!(!registry.contains("bullet_1"));
        assert_eq!(session.version(), 3);
        assert_eq!(session.ack_version(), 0);
    }

    #[test]
    fn test_server_to_client_replication() {
        let mut world = Registry::tracked(DefaultEntityFactory);
        let mut tracker = ChangeTracker::new(64);
        let mut session = SyncSession::new();
        let mut replica = Registry::new(DefaultEntityFactory);
        let demux = Demultiplexer::game();

        let mut replicate = |world: &Registry, tracker: &ChangeTracker| {
            let since = session.ack_version();
            for message in build_gamestates(tracker, world, since, 512) {
                let decoded = demux.decode(&datagram(&message)).unwrap();
                let Message::Gamestate(gamestate) = decoded else {
                    panic!("Expected a gamestate");
                };
                session.receive(gamestate, &mut replica);
            }
            session.version()
        };

        let player = world.spawn(&Family::from(Family::PLAYER)).unwrap();
        world
            .set(&player, Attribute::Health, AttributeValue::Integer(100))
            .unwrap();
        tracker.commit(world.drain_changes());
        for _ in 0..40 {
            world.spawn(&Family::from(Family::BULLET)).unwrap();
        }
        tracker.commit(world.drain_changes());
        assert_eq!(replicate(&world, &tracker), 2);

        world
            .set(&player, Attribute::Health, AttributeValue::Integer(75))
            .unwrap();
        tracker.commit(world.drain_changes());
        world.remove(&player);
        tracker.commit(world.drain_changes());
        assert_eq!(replicate(&world, &tracker), 4);

        assert_eq!(replica.len(), world.len());
        assert!(!replica.contains(&player));
    }

    #[test]
    fn test_ack_in_flight_does_not_force_resync() {
        let mut world = Registry::tracked(DefaultEntityFactory);
        let mut tracker = ChangeTracker::new(64);
        let mut session = SyncSession::new();
        let mut replica = Registry::new(DefaultEntityFactory);

        let mut deliver = |messages: Vec<Message>, session: &mut SyncSession| {
            messages
                .into_iter()
                .map(|message| {
                    let Message::Gamestate(gamestate) = message else {
                        panic!("Expected a gamestate");
                    };
                    session.receive(gamestate, &mut replica)
                })
                .collect::<Vec<_>>()
        };

        let bullet = world.spawn(&Family::from(Family::BULLET)).unwrap();
        tracker.commit(world.drain_changes());
        deliver(build_gamestates(&tracker, &world, 0, 1024), &mut session);
        assert_eq!(session.version(), 1);

        let move_to = |world: &mut Registry, x: f32| {
            let position = AttributeValue::Vector2(Vector2::new(x, 0.0));
            world.set(&bullet, Attribute::Position, position).unwrap();
        };
        move_to(&mut world, 1.0);
        tracker.commit(world.drain_changes());
        deliver(build_gamestates(&tracker, &world, 1, 1024), &mut session);
        assert_eq!(session.version(), 2);

        // The server has not seen the ack for 2 yet and still sends from 1
        move_to(&mut world, 2.0);
        tracker.commit(world.drain_changes());
        let outcomes = deliver(build_gamestates(&tracker, &world, 1, 1024), &mut session);
        assert_eq!(outcomes, vec![SyncOutcome::Ignored]);
        assert_eq!(session.ack_version(), 2);

        let outcomes = deliver(build_gamestates(&tracker, &world, 2, 1024), &mut session);
        assert_eq!(outcomes, vec![SyncOutcome::Applied { version: 3 }]);
        let position = replica
            .get(&bullet)
            .and_then(|entity| entity.get(Attribute::Position))
            .and_then(AttributeValue::as_vector)
            .unwrap();
        assert_approx_eq!(position.x, 2.0);
    }

    #[test]
    fn test_changes_coalesce_across_versions() {
        let mut world = Registry::tracked(DefaultEntityFactory);
        let mut tracker = ChangeTracker::new(64);

        let bullet = world.spawn(&Family::from(Family::BULLET)).unwrap();
        tracker.commit(world.drain_changes());
        for step in 1..=5 {
            world
                .set(
                    &bullet,
                    Attribute::Position,
                    AttributeValue::Vector2(Vector2::new(step as f32, 0.0)),
                )
                .unwrap();
            tracker.commit(world.drain_changes());
        }

        let snapshot = tracker.snapshot(1).unwrap();
        assert_eq!(snapshot.first_version, 1);
        assert_eq!(snapshot.last_version, 6);
        assert!(snapshot.created.is_empty());
        assert_eq!(snapshot.updated[&bullet].len(), 1);

        // Only the latest value goes on the wire
        let resolved = snapshot.resolve(&world);
        assert_eq!(
            resolved.updated[&bullet][&Attribute::Position],
            AttributeValue::Vector2(Vector2::new(5.0, 0.0))
        );
    }

    #[test]
    fn test_unknown_attribute_is_skipped() {
        let mut writer = WireWriter::new(256);
        writer.write_u32(GAME_PROTOCOL_ID).unwrap();
        writer.write_u8(game::GAMESTATE).unwrap();
        writer.write_u32(0).unwrap();
        writer.write_u32(1).unwrap();
        writer.write_u16(0).unwrap();
        writer.write_u16(1).unwrap();

        writer.write_u32(0).unwrap();
        writer.write_u32(1).unwrap();
        writer.write_count(0).unwrap();
        writer.write_count(1).unwrap();
        writer.write_string("bullet_1").unwrap();
        writer.write_string(Family::BULLET).unwrap();
        writer.write_count(1).unwrap();
        writer.write_string("bullet_1").unwrap();
        writer.write_count(2).unwrap();
        // An integer attribute from a newer schema
        writer.write_u16((ValueType::Integer.code() << 12) | 0x0ff).unwrap();
        writer.write_i32(42).unwrap();
        let position = AttributeValue::Vector2(Vector2::new(1.0, 2.0));
        writer.write_attribute(Attribute::Position, &position).unwrap();

        let decoded = Demultiplexer::game().decode(writer.as_bytes()).unwrap();
        let Message::Gamestate(gamestate) = decoded else {
            panic!("Expected a gamestate");
        };
        let attributes = &gamestate.changes.updated["bullet_1"];
        assert_eq!(attributes.len(), 1);
        assert!(attributes.contains_key(&Attribute::Position));

        let mut session = SyncSession::new();
        let mut registry = Registry::new(DefaultEntityFactory);
        assert_eq!(
            session.receive(gamestate, &mut registry),
            SyncOutcome::Applied { version: 1 }
        );
        assert!(registry.contains("bullet_1"));
    }

    #[test]
    fn test_cross_protocol_datagrams() {
        let game_only = Demultiplexer::game();
        let bytes = datagram(&Message::GetServers);
        assert!(matches!(
            game_only.decode(&bytes),
            Err(CodecError::UnknownMessageType { .. })
        ));
        assert_eq!(Demultiplexer::all().decode(&bytes).unwrap(), Message::GetServers);
    }
}

mod liveness_tests {
    use super::*;

    #[test]
    fn test_probe_then_death() {
        let start = Instant::now();
        let check = Duration::from_millis(1000);
        let wait = Duration::from_millis(1000);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut connection =
            ServerConnection::new(addr, "player_1".into(), "alice".into(), start);

        assert_eq!(
            connection.poll(start + Duration::from_millis(500), check, wait),
            LivenessAction::None
        );
        assert_eq!(
            connection.poll(start + Duration::from_millis(1100), check, wait),
            LivenessAction::SendProbe
        );
        assert_eq!(connection.liveness(), Liveness::AwaitingAck);

        assert_eq!(
            connection.poll(start + Duration::from_millis(2200), check, wait),
            LivenessAction::Died
        );
        assert_eq!(connection.liveness(), Liveness::Dead);
    }

    #[test]
    fn test_answered_probe_keeps_connection() {
        let start = Instant::now();
        let check = Duration::from_millis(1000);
        let wait = Duration::from_millis(1000);
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let mut connection =
            ServerConnection::new(addr, "player_1".into(), "alice".into(), start);

        connection.poll(start + Duration::from_millis(1100), check, wait);
        connection.touch(start + Duration::from_millis(1500));
        assert_eq!(connection.liveness(), Liveness::Active);
        assert_eq!(
            connection.poll(start + Duration::from_millis(2000), check, wait),
            LivenessAction::None
        );
    }
}

mod network_tests {
    use super::*;
    use tokio::net::UdpSocket;
    use tokio_test::assert_ok;

    fn local_server_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            tick_duration: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn spawn_server(
        config: ServerConfig,
    ) -> (SocketAddr, tokio::sync::mpsc::UnboundedSender<ServerMessage>) {
        let mut server = Server::new(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let control = server.control();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        (addr, control)
    }

    #[tokio::test]
    async fn test_client_login_and_replication() {
        let (server_addr, control) = spawn_server(local_server_config()).await;

        let mut client = Client::new(&server_addr.to_string(), "alice").await.unwrap();
        client.input_manager().press(PlayerAction::WalkRight);
        assert_ok!(client.run_for(Duration::from_millis(500)).await);

        assert!(client.session().version() > 0);
        let players: Vec<&Entity> = client
            .registry()
            .iter()
            .filter(|entity| entity.family().as_str() == Family::PLAYER)
            .collect();
        assert_eq!(players.len(), 1);
        assert!(client
            .registry()
            .iter()
            .any(|entity| entity.family().as_str() == Family::MAP));

        let _ = control.send(ServerMessage::Shutdown);
    }

    #[tokio::test]
    async fn test_player_info_request() {
        let (server_addr, control) = spawn_server(local_server_config()).await;

        let mut client = Client::new(&server_addr.to_string(), "alice")
            .await
            .unwrap()
            .with_team(Team::Red)
            .with_player_info();
        assert_ok!(client.run_for(Duration::from_millis(400)).await);

        let players = client.players();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].player_name, "alice");
        assert_eq!(players[0].team, Team::Red);
        assert!(players[0].entity_name.starts_with(Family::PLAYER));

        let _ = control.send(ServerMessage::Shutdown);
    }

    #[tokio::test]
    async fn test_malformed_datagrams_do_not_stop_server() {
        let (server_addr, control) = spawn_server(local_server_config()).await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(&[], server_addr).await.unwrap();
        socket
            .send_to(&[0xde, 0xad, 0xbe, 0xef, 0x00], server_addr)
            .await
            .unwrap();
        let mut truncated = datagram(&Message::Login {
            username: "mallory".into(),
        });
        truncated.truncate(truncated.len() - 2);
        socket.send_to(&truncated, server_addr).await.unwrap();

        let mut client = Client::new(&server_addr.to_string(), "bob").await.unwrap();
        client.run_for(Duration::from_millis(300)).await.unwrap();
        assert!(client.session().version() > 0);

        let _ = control.send(ServerMessage::Shutdown);
    }

    #[tokio::test]
    async fn test_directory_lists_verified_server() {
        let mut directory = DirectoryServer::new(DirectoryConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        let directory_addr = directory.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = directory.run().await;
        });

        let config = ServerConfig {
            name: "integration".to_string(),
            game_mode: GameMode::TeamDeathmatch,
            directory: Some(directory_addr),
            announce_interval: Duration::from_millis(50),
            ..local_server_config()
        };
        let (server_addr, control) = spawn_server(config).await;

        tokio::time::sleep(Duration::from_millis(300)).await;
        let servers = query_servers(&directory_addr.to_string(), Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(servers.len(), 1);
        let listed = &servers[0];
        assert_eq!(SocketAddr::V4(listed.address), server_addr);
        assert_eq!(listed.name, "integration");
        assert_eq!(listed.game_mode, GameMode::TeamDeathmatch);
        assert_eq!(listed.players, 0);

        let _ = control.send(ServerMessage::Shutdown);
    }
}
