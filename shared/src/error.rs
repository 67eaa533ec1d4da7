//! Error types for the replication core
//!
//! Every error here is recoverable: a datagram that fails to decode is
//! dropped, a stale client gets a full resync, and a bad registry call is
//! reported back to the game logic that made it.

use crate::attribute::{Attribute, ValueType};
use thiserror::Error;

/// Failures while reading or writing wire data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("datagram truncated: needed {needed} more bytes")]
    Truncated { needed: usize },
    #[error("buffer overflow: {needed} bytes needed but capacity is {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
    #[error("unknown protocol identifier {0:#010x}")]
    UnknownProtocol(u32),
    #[error("no decoder registered for message type {tag} of protocol {protocol:#010x}")]
    UnknownMessageType { protocol: u32, tag: u8 },
    #[error("attribute id {0:#06x} has an unknown value type")]
    UnknownValueType(u16),
    #[error("value for {attribute:?} is not of declared type {expected:?}")]
    TypeMismatch {
        attribute: Attribute,
        expected: ValueType,
    },
    #[error("{field} is {len} bytes, at most {max} allowed")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("change set {0}")]
    InconsistentChanges(&'static str),
    #[error("unknown {kind} code {code}")]
    UnknownCode { kind: &'static str, code: i64 },
}

/// Failures of registry mutations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("entity {0} does not exist")]
    NoSuchEntity(String),
    #[error("entity {0} already exists")]
    DuplicateEntity(String),
    #[error("no archetype known for family {0}")]
    UnknownFamily(String),
    #[error("value for {attribute:?} is not of declared type {expected:?}")]
    TypeMismatch {
        attribute: Attribute,
        expected: ValueType,
    },
}

/// Failures of the change tracker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The requested baseline is no longer (or not yet) covered by history
    #[error("version {requested} is outside retained history {oldest}..={current}")]
    StaleClient {
        requested: u32,
        oldest: u32,
        current: u32,
    },
}
