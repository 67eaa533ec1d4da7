//! Connection tracking and liveness probing for the game server
//!
//! UDP gives no disconnect signal, so every connection runs a small polling
//! state machine once per tick:
//! - Active: when more than the check interval has passed since the last
//!   probe, a probe is sent and the connection awaits an answer
//! - AwaitingAck: any datagram from the address returns it to Active; if the
//!   wait interval passes first, the connection is Dead
//! - Dead: terminal; the connection is purged at the end of the tick and its
//!   player entity removed from the world

use log::info;
use shared::message::{InputMessage, Team};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Observable state of a connection's liveness machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Active,
    AwaitingAck,
    Dead,
}

/// What the tick loop has to do for a connection after polling it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessAction {
    None,
    SendProbe,
    Died,
}

/// Server-side state of one remote client
#[derive(Debug)]
pub struct ServerConnection {
    pub addr: SocketAddr,
    /// Name of the player entity this connection controls
    pub player_entity: String,
    pub username: String,
    pub team: Team,
    /// Highest version the client reported as fully applied
    pub last_acked_version: u32,
    /// Last time any datagram arrived from this address
    pub last_seen: Instant,
    /// Latest input, consumed by the game rules each tick
    pub input: InputMessage,
    last_probe: Instant,
    probe_outstanding: bool,
    alive: bool,
}

impl ServerConnection {
    /// Creates an active connection for a freshly logged in player
    ///
    /// The probe clock starts at `now`, so the first probe goes out one
    /// check interval after login. Nothing is acknowledged yet, which makes
    /// the first gamestate a full state.
    pub fn new(addr: SocketAddr, player_entity: String, username: String, now: Instant) -> Self {
        Self {
            addr,
            player_entity,
            username,
            team: Team::Unselected,
            last_acked_version: 0,
            last_seen: now,
            input: InputMessage::default(),
            last_probe: now,
            probe_outstanding: false,
            alive: true,
        }
    }

    /// Current liveness state, derived from the probe bookkeeping
    pub fn liveness(&self) -> Liveness {
        if !self.alive {
            Liveness::Dead
        } else if self.probe_outstanding {
            Liveness::AwaitingAck
        } else {
            Liveness::Active
        }
    }

    /// Records inbound traffic; any datagram answers an outstanding probe
    pub fn touch(&mut self, now: Instant) {
        if !self.alive {
            return;
        }
        self.last_seen = now;
        self.probe_outstanding = false;
    }

    /// Records the version the client acknowledged in its latest input
    pub fn acknowledge(&mut self, version: u32) {
        self.last_acked_version = version;
    }

    /// Moves the connection straight to Dead, as on logout
    pub fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Advances the liveness state machine
    ///
    /// Returns `SendProbe` when an Active connection has gone more than
    /// `check` without a probe, and `Died` when an outstanding probe has
    /// gone unanswered for `wait`. A dead connection stays dead.
    pub fn poll(&mut self, now: Instant, check: Duration, wait: Duration) -> LivenessAction {
        if !self.alive {
            return LivenessAction::None;
        }
        let since_probe = now.saturating_duration_since(self.last_probe);

        if self.probe_outstanding {
            if since_probe >= wait {
                self.alive = false;
                return LivenessAction::Died;
            }
            return LivenessAction::None;
        }

        if since_probe > check {
            self.probe_outstanding = true;
            self.last_probe = now;
            return LivenessAction::SendProbe;
        }
        LivenessAction::None
    }
}

/// All connections of a game server, keyed by remote address
///
/// The manager enforces the client limit and drives the liveness machine of
/// every connection once per tick. It never touches the world; the tick loop
/// removes the player entities of the connections it purges.
pub struct ClientManager {
    clients: HashMap<SocketAddr, ServerConnection>,
    max_clients: usize,
    check_interval: Duration,
    wait_interval: Duration,
}

impl ClientManager {
    /// Creates an empty manager with the given capacity and liveness timing
    pub fn new(max_clients: usize, check_interval: Duration, wait_interval: Duration) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            check_interval,
            wait_interval,
        }
    }

    /// Returns true once `max_clients` connections are registered
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Adds a connection. Returns the connection it replaced, if the address
    /// was already known.
    pub fn add_client(&mut self, connection: ServerConnection) -> Option<ServerConnection> {
        info!(
            "Client {} connected from {} as {}",
            connection.username, connection.addr, connection.player_entity
        );
        self.clients.insert(connection.addr, connection)
    }

    /// Removes the connection of `addr`, logging the disconnect
    ///
    /// The caller owns the returned connection and is responsible for
    /// removing its player entity from the world.
    pub fn remove_client(&mut self, addr: &SocketAddr) -> Option<ServerConnection> {
        let removed = self.clients.remove(addr);
        if let Some(connection) = &removed {
            info!("Client {} at {} disconnected", connection.username, addr);
        }
        removed
    }

    /// Looks up the connection of a remote address
    pub fn get(&self, addr: &SocketAddr) -> Option<&ServerConnection> {
        self.clients.get(addr)
    }

    /// Mutable lookup, used to store inputs, acks and team changes
    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut ServerConnection> {
        self.clients.get_mut(addr)
    }

    /// Marks inbound traffic from `addr`. Returns false for unknown addresses.
    pub fn touch(&mut self, addr: &SocketAddr, now: Instant) -> bool {
        match self.clients.get_mut(addr) {
            Some(connection) => {
                connection.touch(now);
                true
            }
            None => false,
        }
    }

    /// Polls every connection once and returns the addresses to probe
    pub fn check_liveness(&mut self, now: Instant) -> Vec<SocketAddr> {
        let mut probes = Vec::new();
        for connection in self.clients.values_mut() {
            match connection.poll(now, self.check_interval, self.wait_interval) {
                LivenessAction::SendProbe => probes.push(connection.addr),
                LivenessAction::Died => info!(
                    "Client {} at {} stopped answering liveness probes",
                    connection.username, connection.addr
                ),
                LivenessAction::None => {}
            }
        }
        probes
    }

    /// Removes and returns every dead connection
    pub fn purge_dead(&mut self) -> Vec<ServerConnection> {
        let dead: Vec<SocketAddr> = self
            .clients
            .values()
            .filter(|connection| connection.liveness() == Liveness::Dead)
            .map(|connection| connection.addr)
            .collect();

        dead.iter()
            .filter_map(|addr| self.remove_client(addr))
            .collect()
    }

    /// Iterates over every connection, dead ones included until purged
    pub fn iter(&self) -> impl Iterator<Item = &ServerConnection> {
        self.clients.values()
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
