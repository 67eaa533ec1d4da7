//! Directory (master server) keeping the list of running game servers
//!
//! A game server announces itself with a ServerNotification. The directory
//! answers with a random challenge and only lists the server once the same
//! challenge comes back from the announcing address, so a spoofed source
//! address cannot get a server listed. Listed servers keep announcing; those
//! that stop are dropped after the configured timeout.

use crate::config::DirectoryConfig;
use log::{debug, error, info, warn};
use shared::message::{Message, ServerData};
use shared::{Demultiplexer, WireWriter};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

#[derive(Debug)]
struct Listing {
    server: ServerData,
    last_seen: Instant,
    challenge: u64,
    verified: bool,
}

/// The server list and its challenge bookkeeping
pub struct Directory {
    listings: HashMap<SocketAddr, Listing>,
    server_timeout: Duration,
}

impl Directory {
    pub fn new(server_timeout: Duration) -> Self {
        Self {
            listings: HashMap::new(),
            server_timeout,
        }
    }

    /// Handles one message; returns the reply for `addr`, if any
    pub fn handle_message(
        &mut self,
        message: Message,
        addr: SocketAddr,
        now: Instant,
    ) -> Option<Message> {
        match message {
            Message::ServerNotification { server } => {
                let server = server.with_source(addr);
                match self.listings.get_mut(&addr) {
                    Some(listing) if listing.verified => {
                        listing.server = server;
                        listing.last_seen = now;
                        None
                    }
                    _ => {
                        let challenge = rand::random::<u64>();
                        debug!("Challenging {} ({}) with {:#x}", server.name, addr, challenge);
                        self.listings.insert(
                            addr,
                            Listing {
                                server,
                                last_seen: now,
                                challenge,
                                verified: false,
                            },
                        );
                        Some(Message::ServerNotificationResponse { challenge })
                    }
                }
            }

            Message::ChallengeResponse { challenge } => {
                match self.listings.get_mut(&addr) {
                    Some(listing) if listing.challenge == challenge => {
                        if !listing.verified {
                            info!(
                                "Listing server {} at {}",
                                listing.server.name, listing.server.address
                            );
                        }
                        listing.verified = true;
                        listing.last_seen = now;
                    }
                    _ => warn!("Wrong or unsolicited challenge response from {}", addr),
                }
                None
            }

            Message::GetServers => Some(Message::Servers {
                servers: self.servers(),
            }),

            other => {
                warn!("Unexpected {:?} message from {}", other.tag(), addr);
                None
            }
        }
    }

    /// Drops servers that have not announced within the timeout
    pub fn expire(&mut self, now: Instant) -> usize {
        let timeout = self.server_timeout;
        let before = self.listings.len();
        self.listings.retain(|addr, listing| {
            let fresh = now.saturating_duration_since(listing.last_seen) <= timeout;
            if !fresh {
                info!("Server {} at {} timed out", listing.server.name, addr);
            }
            fresh
        });
        before - self.listings.len()
    }

    /// Verified servers only
    pub fn servers(&self) -> Vec<ServerData> {
        self.listings
            .values()
            .filter(|listing| listing.verified)
            .map(|listing| listing.server.clone())
            .collect()
    }
}

pub struct DirectoryServer {
    socket: UdpSocket,
    config: DirectoryConfig,
    directory: Directory,
}

impl DirectoryServer {
    pub async fn new(config: DirectoryConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind(&config.bind_addr).await?;
        info!("Directory listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            directory: Directory::new(config.server_timeout),
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let demux = Demultiplexer::directory();
        let mut buffer = vec![0u8; self.config.buffer_size];
        let mut writer = WireWriter::new(self.config.buffer_size);
        let mut expiry = interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    let (len, addr) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            error!("Error receiving datagram: {}", e);
                            continue;
                        }
                    };
                    let message = match demux.decode(&buffer[..len]) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Dropping malformed datagram from {}: {}", addr, e);
                            continue;
                        }
                    };

                    let reply = self.directory.handle_message(message, addr, Instant::now());
                    let Some(reply) = reply else {
                        continue;
                    };
                    writer.clear();
                    if let Err(e) = reply.encode(&mut writer) {
                        error!("Failed to encode reply for {}: {}", addr, e);
                        continue;
                    }
                    if let Err(e) = self.socket.send_to(writer.as_bytes(), addr).await {
                        error!("Failed to send reply to {}: {}", addr, e);
                    }
                },

                _ = expiry.tick() => {
                    self.directory.expire(Instant::now());
                },
            }
        }
    }
}
