//! Server network layer handling UDP communications and the tick loop
//!
//! Three tasks share the socket: a receiver that decodes datagrams and queues
//! them for the tick loop, a sender that writes already encoded datagrams, and
//! the tick loop itself, which is the only place the world is mutated. Queued
//! messages are applied at the start of a tick, never in the middle of one.

use crate::client_manager::{ClientManager, ServerConnection};
use crate::config::ServerConfig;
use crate::game::GameState;
use log::{debug, error, info, warn};
use shared::codec::{updated_entry_len, CHANGES_HEADER_LEN};
use shared::message::{GamestateMessage, Message, ServerData, GAMESTATE_HEADER_LEN};
use shared::protocol::MAX_USERNAME_LEN;
use shared::{ChangeTracker, Demultiplexer, Registry, TrackerError, WireWriter};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to the tick loop
#[derive(Debug)]
pub enum ServerMessage {
    DatagramReceived { message: Message, addr: SocketAddr },
    AnnounceDue,
    Shutdown,
}

/// Messages sent from the tick loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendDatagram { data: Vec<u8>, addr: SocketAddr },
}

/// Builds the gamestate messages bringing a client from `since` to the
/// tracker's current version. Empty when the client is up to date.
///
/// A baseline outside retained history is answered with the full world.
pub fn build_gamestates(
    tracker: &ChangeTracker,
    registry: &Registry,
    since: u32,
    buffer_size: usize,
) -> Vec<Message> {
    let change_set = match tracker.snapshot(since) {
        Ok(change_set) if change_set.is_empty() => return Vec::new(),
        Ok(change_set) => change_set,
        Err(TrackerError::StaleClient {
            requested,
            oldest,
            current,
        }) => {
            debug!(
                "Version {} outside {}..={}, sending full state",
                requested, oldest, current
            );
            tracker.full_snapshot(registry)
        }
    };
    if change_set.is_empty() {
        return Vec::new();
    }

    let max_payload = buffer_size.saturating_sub(GAMESTATE_HEADER_LEN);
    let first_version = change_set.first_version;
    let last_version = change_set.last_version;
    let mut scratch = WireWriter::new(buffer_size);

    let mut parts = Vec::new();
    for change_set in ChangeTracker::split(change_set, registry, max_payload) {
        let mut changes = change_set.resolve(registry);
        changes.updated.retain(|name, values| {
            let fits = updated_entry_len(name, values) + CHANGES_HEADER_LEN <= max_payload;
            if !fits {
                warn!("Values of {} exceed one datagram, not replicating them", name);
            }
            fits
        });

        // Indices are assigned once the surviving parts are known
        let message = Message::Gamestate(GamestateMessage {
            known_client_version: first_version,
            current_version: last_version,
            part: 0,
            part_count: 0,
            changes,
        });
        scratch.clear();
        if let Err(e) = message.encode(&mut scratch) {
            error!("Dropping gamestate part that cannot be encoded: {}", e);
            continue;
        }
        parts.push(message);
    }

    let Ok(part_count) = u16::try_from(parts.len()) else {
        error!("Change set needs {} parts, dropping it", parts.len());
        return Vec::new();
    };
    for (index, message) in parts.iter_mut().enumerate() {
        if let Message::Gamestate(gamestate) = message {
            gamestate.part = index as u16;
            gamestate.part_count = part_count;
        }
    }
    parts
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    config: ServerConfig,
    game: GameState,
    clients: ClientManager,
    /// Encode buffer owned by the tick loop
    writer: WireWriter,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        let mut game = GameState::new(config.history_len);
        game.load_map(800, 600)?;

        Ok(Server {
            socket,
            clients: ClientManager::new(
                config.max_clients,
                config.check_interval,
                config.wait_interval,
            ),
            game,
            writer: WireWriter::new(config.buffer_size),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle that stops the tick loop when sent `ServerMessage::Shutdown`
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();
        let buffer_size = self.config.buffer_size;

        tokio::spawn(async move {
            let demux = Demultiplexer::all();
            let mut buffer = vec![0u8; buffer_size];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match demux.decode(&buffer[..len]) {
                        Ok(message) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::DatagramReceived { message, addr })
                            {
                                error!("Failed to send datagram to tick loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving datagram: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that writes the outgoing datagram queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(GameMessage::SendDatagram { data, addr }) = game_rx.recv().await {
                if let Err(e) = socket.send_to(&data, addr).await {
                    error!("Failed to send datagram to {}: {}", addr, e);
                }
            }
        });
    }

    /// Spawns task that periodically asks the tick loop to announce itself
    fn spawn_directory_announcer(&self) {
        let Some(directory) = self.config.directory else {
            return;
        };
        let server_tx = self.server_tx.clone();
        let period = self.config.announce_interval;
        info!("Announcing to directory at {}", directory);

        tokio::spawn(async move {
            let mut interval = interval(period);
            loop {
                interval.tick().await;
                if server_tx.send(ServerMessage::AnnounceDue).is_err() {
                    break;
                }
            }
        });
    }

    /// Encodes a message with the tick loop's buffer and queues it
    fn send_message(&mut self, message: &Message, addr: SocketAddr) {
        self.writer.clear();
        if let Err(e) = message.encode(&mut self.writer) {
            error!("Failed to encode {:?} message for {}: {}", message.tag(), addr, e);
            return;
        }
        let data = self.writer.as_bytes().to_vec();
        if let Err(e) = self.game_tx.send(GameMessage::SendDatagram { data, addr }) {
            error!("Failed to queue datagram for sending: {}", e);
        }
    }

    /// Applies one decoded message. Only called at the start of a tick.
    fn handle_message(&mut self, message: Message, addr: SocketAddr, now: Instant) {
        let known = self.clients.touch(&addr, now);

        match message {
            Message::Login { username } => self.handle_login(username, addr, now),

            Message::Logout => {
                if let Some(connection) = self.clients.get_mut(&addr) {
                    connection.mark_dead();
                }
            }

            Message::Input(input) => {
                if let Some(connection) = self.clients.get_mut(&addr) {
                    connection.acknowledge(input.version);
                    connection.input = input;
                }
            }

            Message::TeamSelect { team } => {
                if let Some(connection) = self.clients.get_mut(&addr) {
                    connection.team = team;
                    let player = connection.player_entity.clone();
                    if let Err(e) = self.game.set_team(&player, team) {
                        warn!("Failed to set team of {}: {}", player, e);
                    }
                }
            }

            Message::GetPlayerInfo if known => {
                let players = self.game.player_info(self.clients.iter());
                self.send_message(&Message::GetPlayerInfoResponse { players }, addr);
            }

            Message::Alive => {}

            Message::ServerNotificationResponse { challenge } => {
                if Some(addr) == self.config.directory {
                    self.send_message(&Message::ChallengeResponse { challenge }, addr);
                } else {
                    warn!("Ignoring challenge from unknown directory {}", addr);
                }
            }

            other => warn!("Unexpected {:?} message from {}", other.tag(), addr),
        }
    }

    fn handle_login(&mut self, mut username: String, addr: SocketAddr, now: Instant) {
        if username.len() > MAX_USERNAME_LEN {
            let mut end = MAX_USERNAME_LEN;
            while !username.is_char_boundary(end) {
                end -= 1;
            }
            username.truncate(end);
            warn!("Truncated overlong username from {} to {}", addr, username);
        }
        if let Some(existing) = self.clients.remove_client(&addr) {
            info!("Replacing existing connection from {}", addr);
            self.game.remove_player(&existing.player_entity);
        }
        if self.clients.is_full() {
            warn!("Server full, ignoring login of {} from {}", username, addr);
            return;
        }

        let player_entity = match self.game.add_player(&username) {
            Ok(name) => name,
            Err(e) => {
                error!("Failed to create player for {}: {}", username, e);
                return;
            }
        };
        self.clients.add_client(ServerConnection::new(
            addr,
            player_entity.clone(),
            username,
            now,
        ));
        self.send_message(&Message::LoginResponse { player_entity }, addr);
    }

    fn announce(&mut self) {
        let Some(directory) = self.config.directory else {
            return;
        };
        let port = match self.socket.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                error!("Failed to read local address: {}", e);
                return;
            }
        };
        let server = ServerData {
            address: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port),
            name: self.config.name.clone(),
            players: self.clients.len() as u32,
            max_players: self.config.max_clients as u32,
            game_mode: self.config.game_mode,
        };
        self.send_message(&Message::ServerNotification { server }, directory);
    }

    /// Runs one tick: simulate, poll liveness, commit, replicate
    fn tick(&mut self, dt: f32, now: Instant) {
        let inputs: Vec<(String, shared::InputMessage)> = self
            .clients
            .iter()
            .map(|connection| (connection.player_entity.clone(), connection.input.clone()))
            .collect();
        if let Err(e) = self.game.update(
            inputs.iter().map(|(player, input)| (player.as_str(), input)),
            dt,
        ) {
            error!("Game update failed: {}", e);
        }

        for addr in self.clients.check_liveness(now) {
            self.send_message(&Message::Alive, addr);
        }
        for connection in self.clients.purge_dead() {
            self.game.remove_player(&connection.player_entity);
        }

        self.game.commit();
        self.send_gamestates();
    }

    fn send_gamestates(&mut self) {
        let targets: Vec<(SocketAddr, u32)> = self
            .clients
            .iter()
            .map(|connection| (connection.addr, connection.last_acked_version))
            .collect();

        for (addr, since) in targets {
            let messages = build_gamestates(
                &self.game.tracker,
                &self.game.registry,
                since,
                self.config.buffer_size,
            );
            for message in &messages {
                self.send_message(message, addr);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_directory_announcer();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tick_interval.tick().await;
            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f32();
            last_tick = now;

            // Drain everything queued since the previous tick
            while let Ok(message) = self.server_rx.try_recv() {
                match message {
                    ServerMessage::DatagramReceived { message, addr } => {
                        self.handle_message(message, addr, now);
                    }
                    ServerMessage::AnnounceDue => self.announce(),
                    ServerMessage::Shutdown => {
                        info!("Server shutting down");
                        return Ok(());
                    }
                }
            }

            self.tick(dt, now);

            if self.game.tick % 300 == 0 && !self.clients.is_empty() {
                debug!(
                    "Tick {}: {} clients, version {}, {:.1}Hz",
                    self.game.tick,
                    self.clients.len(),
                    self.game.tracker.version(),
                    1.0 / dt.max(f32::EPSILON)
                );
            }
        }
    }
}
