//! Client-side gamestate synchronization
//!
//! The session tracks the last version fully applied to the local registry.
//! A delta is only applied on top of exactly the version it was computed
//! from. A delta based on an older version than ours overlaps what we
//! already have (our ack is still in flight) and is dropped. A delta based on
//! a newer version means a datagram was lost, and the session asks the
//! server for the whole world again by acknowledging version 0.

use log::{debug, warn};
use shared::{GamestateMessage, Registry, ReplicatedChanges};
use std::collections::BTreeMap;

/// Result of feeding one gamestate message to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The registry now reflects `version`
    Applied { version: u32 },
    /// Part of a split range; waiting for the rest
    Buffered,
    /// Duplicate or older range, dropped
    Ignored,
    /// The delta's baseline is ahead of the local version; a resync was requested
    VersionMismatch { local: u32, baseline: u32 },
}

/// Parts of one version range received so far
#[derive(Debug)]
struct PendingRange {
    known_client_version: u32,
    current_version: u32,
    part_count: u16,
    parts: BTreeMap<u16, ReplicatedChanges>,
}

#[derive(Debug, Default)]
pub struct SyncSession {
    version: u32,
    resync_requested: bool,
    pending: Option<PendingRange>,
}

impl SyncSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last version fully applied
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Version to acknowledge in the next input; 0 while a resync is pending
    pub fn ack_version(&self) -> u32 {
        if self.resync_requested {
            0
        } else {
            self.version
        }
    }

    pub fn resync_requested(&self) -> bool {
        self.resync_requested
    }

    pub fn receive(&mut self, message: GamestateMessage, registry: &mut Registry) -> SyncOutcome {
        let GamestateMessage {
            known_client_version,
            current_version,
            part,
            part_count,
            changes,
        } = message;

        if part_count == 0 || part >= part_count {
            warn!("Dropping gamestate part {} of {}", part, part_count);
            return SyncOutcome::Ignored;
        }
        if current_version <= self.version {
            debug!(
                "Ignoring stale gamestate {}..={} at local version {}",
                known_client_version, current_version, self.version
            );
            return SyncOutcome::Ignored;
        }

        let full_state = known_client_version == 0;
        if !full_state && known_client_version < self.version {
            // Our latest ack has not reached the server yet; the delta from
            // our version is on its way
            debug!(
                "Ignoring gamestate {}..={} overlapping local version {}",
                known_client_version, current_version, self.version
            );
            return SyncOutcome::Ignored;
        }
        if !full_state && known_client_version > self.version {
            warn!(
                "Gamestate based on version {} but local version is {}, requesting resync",
                known_client_version, self.version
            );
            self.resync_requested = true;
            self.pending = None;
            return SyncOutcome::VersionMismatch {
                local: self.version,
                baseline: known_client_version,
            };
        }

        if part_count == 1 {
            return self.apply(full_state, current_version, changes, registry);
        }

        let same_range = self.pending.as_ref().is_some_and(|pending| {
            pending.known_client_version == known_client_version
                && pending.current_version == current_version
                && pending.part_count == part_count
        });
        if !same_range {
            self.pending = Some(PendingRange {
                known_client_version,
                current_version,
                part_count,
                parts: BTreeMap::new(),
            });
        }

        let Some(pending) = self.pending.as_mut() else {
            return SyncOutcome::Buffered;
        };
        pending.parts.insert(part, changes);
        if pending.parts.len() < usize::from(pending.part_count) {
            return SyncOutcome::Buffered;
        }

        let Some(pending) = self.pending.take() else {
            return SyncOutcome::Buffered;
        };
        let mut merged = ReplicatedChanges {
            first_version: known_client_version,
            last_version: current_version,
            ..Default::default()
        };
        for (_, part) in pending.parts {
            merged.absorb(part);
        }
        self.apply(full_state, current_version, merged, registry)
    }

    fn apply(
        &mut self,
        full_state: bool,
        version: u32,
        changes: ReplicatedChanges,
        registry: &mut Registry,
    ) -> SyncOutcome {
        if full_state {
            registry.clear();
        }

        for name in &changes.removed {
            registry.remove(name);
        }
        for (name, family) in &changes.created {
            registry.remove(name);
            if let Err(e) = registry.create(name, family) {
                warn!("Failed to create replicated entity {}: {}", name, e);
            }
        }
        for (name, values) in changes.updated {
            for (attribute, value) in values {
                if let Err(e) = registry.set(&name, attribute, value) {
                    warn!("Failed to update {:?} of {}: {}", attribute, name, e);
                }
            }
        }

        debug!("Applied gamestate up to version {}", version);
        self.version = version;
        self.resync_requested = false;
        self.pending = None;
        SyncOutcome::Applied { version }
    }
}
