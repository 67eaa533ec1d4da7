//! # Replication Core
//!
//! Types and codecs shared by the game server, the game client and the
//! directory server.
//!
//! ## Data flow
//!
//! The server mutates its [`Registry`] during a tick. The registry records
//! every creation, removal and attribute update; at the end of the tick the
//! [`ChangeTracker`] commits those records as a new version. For each client
//! the server asks the tracker for the delta since that client's last
//! acknowledged version, resolves it against the live registry, and encodes
//! it into one or more gamestate datagrams. The client decodes the datagrams
//! through a [`Demultiplexer`] and applies the delta to its own registry.
//!
//! ## Wire format
//!
//! Every datagram starts with a 4-byte protocol id (game or directory) and a
//! 1-byte message tag. All integers are big-endian; see [`codec`] for the
//! field layouts.

pub mod attribute;
pub mod change_set;
pub mod codec;
pub mod entity;
pub mod error;
pub mod message;
pub mod multiplexer;
pub mod protocol;
pub mod registry;
pub mod tracker;

pub use attribute::{Attribute, AttributeMap, AttributeValue, Tile, ValueType, Vector2};
pub use change_set::{ChangeSet, ReplicatedChanges, TickChanges};
pub use codec::{WireReader, WireWriter};
pub use entity::{DefaultEntityFactory, Entity, EntityFactory, Family};
pub use error::{CodecError, RegistryError, TrackerError};
pub use message::{
    GameMode, GamestateMessage, InputMessage, Message, PlayerAction, PlayerInfo, ServerData, Team,
};
pub use multiplexer::Demultiplexer;
pub use protocol::Protocol;
pub use registry::Registry;
pub use tracker::ChangeTracker;
