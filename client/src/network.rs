//! Client network layer: login, gamestate application, input sending and
//! server list queries

use crate::input::InputManager;
use crate::sync::{SyncOutcome, SyncSession};
use log::{debug, error, info, warn};
use shared::message::{Message, PlayerInfo, ServerData, Team};
use shared::protocol::DEFAULT_BUFFER_SIZE;
use shared::{DefaultEntityFactory, Demultiplexer, Registry, WireWriter};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout};

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    username: String,
    team: Option<Team>,
    player_entity: Option<String>,
    /// Ask for the player list as soon as the login is accepted
    player_info_on_login: bool,
    players: Vec<PlayerInfo>,

    registry: Registry,
    session: SyncSession,
    input_manager: InputManager,

    demux: Demultiplexer,
    writer: WireWriter,
    buffer_size: usize,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        username: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            username: username.to_string(),
            team: None,
            player_entity: None,
            player_info_on_login: false,
            players: Vec::new(),
            registry: Registry::new(DefaultEntityFactory),
            session: SyncSession::new(),
            input_manager: InputManager::default(),
            demux: Demultiplexer::game(),
            writer: WireWriter::new(DEFAULT_BUFFER_SIZE),
            buffer_size: DEFAULT_BUFFER_SIZE,
        })
    }

    /// Team to request once logged in
    pub fn with_team(mut self, team: Team) -> Self {
        self.team = Some(team);
        self
    }

    /// Requests the player list right after logging in
    pub fn with_player_info(mut self) -> Self {
        self.player_info_on_login = true;
        self
    }

    /// Player list from the latest `GetPlayerInfoResponse`
    pub fn players(&self) -> &[PlayerInfo] {
        &self.players
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn player_entity(&self) -> Option<&str> {
        self.player_entity.as_deref()
    }

    pub fn input_manager(&mut self) -> &mut InputManager {
        &mut self.input_manager
    }

    async fn send_message(&mut self, message: &Message) -> Result<(), Box<dyn std::error::Error>> {
        self.writer.clear();
        message.encode(&mut self.writer)?;
        self.socket
            .send_to(self.writer.as_bytes(), self.server_addr)
            .await?;
        Ok(())
    }

    pub async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Logging in to {} as {}", self.server_addr, self.username);
        let login = Message::Login {
            username: self.username.clone(),
        };
        self.send_message(&login).await
    }

    /// Asks the server who is playing; the answer lands in `players()`
    pub async fn request_player_info(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_message(&Message::GetPlayerInfo).await
    }

    pub async fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.player_entity.take().is_some() {
            info!("Logging out");
            self.send_message(&Message::Logout).await?;
        }
        Ok(())
    }

    async fn handle_message(&mut self, message: Message) -> Result<(), Box<dyn std::error::Error>> {
        match message {
            Message::LoginResponse { player_entity } => {
                info!("Logged in, controlling {}", player_entity);
                self.player_entity = Some(player_entity);
                if let Some(team) = self.team {
                    self.send_message(&Message::TeamSelect { team }).await?;
                }
                if self.player_info_on_login {
                    self.request_player_info().await?;
                }
            }

            Message::Gamestate(gamestate) => {
                match self.session.receive(gamestate, &mut self.registry) {
                    SyncOutcome::Applied { version } => {
                        debug!("World at version {}, {} entities", version, self.registry.len());
                    }
                    SyncOutcome::VersionMismatch { local, baseline } => {
                        warn!(
                            "Missed gamestate (local {}, server baseline {}), resyncing",
                            local, baseline
                        );
                    }
                    SyncOutcome::Buffered | SyncOutcome::Ignored => {}
                }
            }

            Message::Alive => self.send_message(&Message::Alive).await?,

            Message::GetPlayerInfoResponse { players } => {
                for player in &players {
                    info!(
                        "{} ({}) on team {:?}",
                        player.player_name, player.entity_name, player.team
                    );
                }
                self.players = players;
            }

            other => warn!("Unexpected {:?} message from server", other.tag()),
        }
        Ok(())
    }

    /// Decodes and handles one datagram from the server
    pub async fn process_datagram(
        &mut self,
        data: &[u8],
        from: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if from != self.server_addr {
            debug!("Ignoring datagram from {}", from);
            return Ok(());
        }
        match self.demux.decode(data) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                warn!("Dropping malformed datagram from {}: {}", from, e);
                Ok(())
            }
        }
    }

    async fn send_input(&mut self, now: Instant) -> Result<(), Box<dyn std::error::Error>> {
        if self.player_entity.is_none() {
            return Ok(());
        }
        if let Some(input) = self.input_manager.poll(now, self.session.ack_version()) {
            self.send_message(&Message::Input(input)).await?;
        }
        Ok(())
    }

    /// Runs until the process is stopped
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(None).await
    }

    /// Runs for `duration`, then logs out
    pub async fn run_for(&mut self, duration: Duration) -> Result<(), Box<dyn std::error::Error>> {
        self.run_until(Some(Instant::now() + duration)).await
    }

    async fn run_until(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut input_interval = interval(Duration::from_millis(16));
        let mut login_retry = interval(Duration::from_secs(1));
        login_retry.reset();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                break;
            }

            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, from)) => {
                            if let Err(e) = self.process_datagram(&buffer[..len], from).await {
                                error!("Error handling datagram: {}", e);
                            }
                        },
                        Err(e) => error!("Error receiving datagram: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    if let Err(e) = self.send_input(Instant::now()).await {
                        error!("Error sending input: {}", e);
                    }
                },

                _ = login_retry.tick() => {
                    if self.player_entity.is_none() {
                        self.connect().await?;
                    }
                },
            }
        }

        self.disconnect().await
    }
}

/// Asks a directory server for its list of game servers
pub async fn query_servers(
    directory: &str,
    wait: Duration,
) -> Result<Vec<ServerData>, Box<dyn std::error::Error>> {
    let directory: SocketAddr = directory.parse()?;
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    let demux = Demultiplexer::directory();

    let request = Message::GetServers.to_bytes(DEFAULT_BUFFER_SIZE)?;
    socket.send_to(&request, directory).await?;

    let mut buffer = vec![0u8; DEFAULT_BUFFER_SIZE];
    let deadline = Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (len, from) = timeout(remaining, socket.recv_from(&mut buffer)).await??;
        if from != directory {
            continue;
        }
        match demux.decode(&buffer[..len]) {
            Ok(Message::Servers { servers }) => return Ok(servers),
            Ok(other) => warn!("Unexpected {:?} message from directory", other.tag()),
            Err(e) => warn!("Dropping malformed datagram from directory: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{GamestateMessage, ReplicatedChanges};
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_client_creation() {
        let client = Client::new("127.0.0.1:1234", "alice").await.unwrap();
        assert!(client.player_entity().is_none());
        assert_eq!(client.session().version(), 0);
        assert!(client.registry().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_server_address() {
        assert!(Client::new("not an address", "alice").await.is_err());
    }

    #[tokio::test]
    async fn test_datagrams_from_strangers_ignored() {
        let mut client = Client::new("127.0.0.1:1234", "alice").await.unwrap();
        let message = Message::LoginResponse {
            player_entity: "player_1".into(),
        };
        let bytes = message.to_bytes(256).unwrap();

        let stranger: SocketAddr = "127.0.0.1:4321".parse().unwrap();
        client.process_datagram(&bytes, stranger).await.unwrap();
        assert!(client.player_entity().is_none());
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_dropped() {
        let mut client = Client::new("127.0.0.1:1234", "alice").await.unwrap();
        let server: SocketAddr = "127.0.0.1:1234".parse().unwrap();

        assert_ok!(client.process_datagram(&[1, 2, 3], server).await);
        assert_ok!(client.process_datagram(&[0xff; 32], server).await);
        assert_eq!(client.session().version(), 0);
    }

    #[tokio::test]
    async fn test_player_info_response_is_stored() {
        let mut client = Client::new("127.0.0.1:1234", "alice").await.unwrap();
        let server: SocketAddr = "127.0.0.1:1234".parse().unwrap();
        let message = Message::GetPlayerInfoResponse {
            players: vec![PlayerInfo {
                entity_name: "player_1".into(),
                player_name: "alice".into(),
                team: Team::Blue,
            }],
        };
        let bytes = message.to_bytes(256).unwrap();

        assert_ok!(client.process_datagram(&bytes, server).await);
        assert_eq!(client.players().len(), 1);
        assert_eq!(client.players()[0].team, Team::Blue);
    }

    #[tokio::test]
    async fn test_gamestate_updates_registry() {
        let mut client = Client::new("127.0.0.1:1234", "alice").await.unwrap();
        let server: SocketAddr = "127.0.0.1:1234".parse().unwrap();

        let mut changes = ReplicatedChanges {
            first_version: 0,
            last_version: 2,
            ..Default::default()
        };
        changes
            .created
            .insert("player_1".into(), shared::Family::from(shared::Family::PLAYER));
        let message = Message::Gamestate(GamestateMessage {
            known_client_version: 0,
            current_version: 2,
            part: 0,
            part_count: 1,
            changes,
        });
        let bytes = message.to_bytes(DEFAULT_BUFFER_SIZE).unwrap();

        assert_ok!(client.process_datagram(&bytes, server).await);
        assert_eq!(client.session().version(), 2);
        assert!(client.registry().contains("player_1"));
    }
}
