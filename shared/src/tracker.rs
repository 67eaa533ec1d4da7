//! Version history of registry mutations
//!
//! The tracker keeps one coalesced `TickChanges` per committed version and
//! answers "what changed since version v" by folding the retained history.

use crate::change_set::{ChangeSet, TickChanges};
use crate::codec::{self, CHANGES_HEADER_LEN};
use crate::error::TrackerError;
use crate::registry::Registry;
use log::{debug, warn};
use std::collections::VecDeque;

/// Number of versions retained by default
pub const DEFAULT_HISTORY_LEN: usize = 256;

pub struct ChangeTracker {
    version: u32,
    history: VecDeque<(u32, TickChanges)>,
    max_history: usize,
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl ChangeTracker {
    pub fn new(max_history: usize) -> Self {
        Self {
            version: 0,
            history: VecDeque::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Oldest baseline a delta can still be computed from
    pub fn oldest_baseline(&self) -> u32 {
        self.history
            .front()
            .map(|(version, _)| version - 1)
            .unwrap_or(self.version)
    }

    /// Records one tick's mutations. The version only advances when the tick
    /// changed something.
    pub fn commit(&mut self, changes: TickChanges) -> Option<u32> {
        if changes.is_empty() {
            return None;
        }
        self.version += 1;
        self.history.push_back((self.version, changes));
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        Some(self.version)
    }

    /// Cumulative delta from `since` (exclusive) to the current version
    pub fn snapshot(&self, since: u32) -> Result<ChangeSet, TrackerError> {
        let oldest = self.oldest_baseline();
        if since > self.version || since < oldest {
            return Err(TrackerError::StaleClient {
                requested: since,
                oldest,
                current: self.version,
            });
        }

        let mut merged = TickChanges::default();
        for (_, changes) in self.history.iter().filter(|(version, _)| *version > since) {
            merged.merge(changes);
        }
        Ok(ChangeSet::from_changes(since, self.version, merged))
    }

    /// The whole registry as a delta from the empty world
    pub fn full_snapshot(&self, registry: &Registry) -> ChangeSet {
        let mut changes = TickChanges::default();
        for entity in registry.iter() {
            changes.record_created(entity.name(), entity.family());
            for attribute in entity.attributes().keys() {
                changes.record_updated(entity.name(), *attribute);
            }
        }
        ChangeSet::from_changes(0, self.version, changes)
    }

    /// Splits a change set by entity so each part encodes within `max_len`
    /// bytes. Every part keeps the version range of the unsplit set.
    pub fn split(change_set: ChangeSet, registry: &Registry, max_len: usize) -> Vec<ChangeSet> {
        if change_set.is_empty() {
            return vec![change_set];
        }

        let mut parts = Vec::new();
        let mut current = ChangeSet::empty(change_set.first_version, change_set.last_version);
        let mut current_len = CHANGES_HEADER_LEN;

        for name in change_set.entity_names() {
            let cost = entity_cost(&change_set, registry, name);
            if cost + CHANGES_HEADER_LEN > max_len {
                warn!(
                    "Entity {} needs {} bytes, more than a datagram holds",
                    name, cost
                );
            }
            if current_len + cost > max_len && !current.is_empty() {
                parts.push(std::mem::replace(
                    &mut current,
                    ChangeSet::empty(change_set.first_version, change_set.last_version),
                ));
                current_len = CHANGES_HEADER_LEN;
            }

            if change_set.removed.contains(name) {
                current.removed.insert(name.to_string());
            }
            if let Some(family) = change_set.created.get(name) {
                current.created.insert(name.to_string(), family.clone());
            }
            if let Some(attributes) = change_set.updated.get(name) {
                current.updated.insert(name.to_string(), attributes.clone());
            }
            current_len += cost;
        }
        parts.push(current);

        if parts.len() > 1 {
            debug!(
                "Split change set {}..={} into {} parts",
                change_set.first_version,
                change_set.last_version,
                parts.len()
            );
        }
        parts
    }
}

/// Encoded bytes one entity contributes to a change set
fn entity_cost(change_set: &ChangeSet, registry: &Registry, name: &str) -> usize {
    let mut cost = 0;
    if change_set.removed.contains(name) {
        cost += codec::removed_entry_len(name);
    }
    if let Some(family) = change_set.created.get(name) {
        cost += codec::created_entry_len(name, family);
    }
    if let (Some(attributes), Some(entity)) = (change_set.updated.get(name), registry.get(name)) {
        cost += 8 + name.len();
        cost += attributes
            .iter()
            .filter_map(|attribute| entity.get(*attribute))
            .map(codec::attribute_len)
            .sum::<usize>();
    }
    cost
}
