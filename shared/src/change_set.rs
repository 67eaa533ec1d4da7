//! Deltas between two versions of the registry

use crate::attribute::{Attribute, AttributeMap};
use crate::entity::Family;
use crate::registry::Registry;
use std::collections::{BTreeMap, BTreeSet};

/// Mutations recorded during a single tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickChanges {
    pub removed: BTreeSet<String>,
    pub created: BTreeMap<String, Family>,
    pub updated: BTreeMap<String, BTreeSet<Attribute>>,
}

impl TickChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.created.is_empty() && self.updated.is_empty()
    }

    pub(crate) fn record_created(&mut self, name: &str, family: &Family) {
        self.removed.remove(name);
        self.created.insert(name.to_string(), family.clone());
    }

    pub(crate) fn record_removed(&mut self, name: &str) {
        self.created.remove(name);
        self.updated.remove(name);
        self.removed.insert(name.to_string());
    }

    pub(crate) fn record_updated(&mut self, name: &str, attribute: Attribute) {
        if self.removed.contains(name) {
            return;
        }
        self.updated
            .entry(name.to_string())
            .or_default()
            .insert(attribute);
    }

    /// Folds a later tick into this one, removal being terminal
    pub(crate) fn merge(&mut self, later: &TickChanges) {
        for name in &later.removed {
            self.record_removed(name);
        }
        for (name, family) in &later.created {
            self.record_created(name, family);
        }
        for (name, attributes) in &later.updated {
            for attribute in attributes {
                self.record_updated(name, *attribute);
            }
        }
    }
}

/// Cumulative delta from `first_version` (exclusive) to `last_version`
/// (inclusive), as tracked by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub first_version: u32,
    pub last_version: u32,
    pub removed: BTreeSet<String>,
    pub created: BTreeMap<String, Family>,
    pub updated: BTreeMap<String, BTreeSet<Attribute>>,
}

impl ChangeSet {
    pub fn empty(first_version: u32, last_version: u32) -> Self {
        Self::from_changes(first_version, last_version, TickChanges::default())
    }

    pub fn from_changes(first_version: u32, last_version: u32, changes: TickChanges) -> Self {
        debug_assert!(first_version <= last_version);
        Self {
            first_version,
            last_version,
            removed: changes.removed,
            created: changes.created,
            updated: changes.updated,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.created.is_empty() && self.updated.is_empty()
    }

    /// Names of every entity this change set mentions
    pub fn entity_names(&self) -> BTreeSet<&str> {
        self.removed
            .iter()
            .chain(self.created.keys())
            .chain(self.updated.keys())
            .map(String::as_str)
            .collect()
    }

    /// Resolves the updated attribute sets into the registry's current values
    ///
    /// Entities missing from the registry, or attributes an entity no longer
    /// carries, are skipped.
    pub fn resolve(&self, registry: &Registry) -> ReplicatedChanges {
        let mut updated = BTreeMap::new();
        for (name, attributes) in &self.updated {
            let Some(entity) = registry.get(name) else {
                log::debug!("Skipping update for vanished entity {}", name);
                continue;
            };
            let values: AttributeMap = attributes
                .iter()
                .filter_map(|attribute| {
                    entity
                        .get(*attribute)
                        .map(|value| (*attribute, value.clone()))
                })
                .collect();
            updated.insert(name.clone(), values);
        }

        ReplicatedChanges {
            first_version: self.first_version,
            last_version: self.last_version,
            removed: self.removed.clone(),
            created: self.created.clone(),
            updated,
        }
    }
}

/// A change set as carried on the wire: updated entries hold values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplicatedChanges {
    pub first_version: u32,
    pub last_version: u32,
    pub removed: BTreeSet<String>,
    pub created: BTreeMap<String, Family>,
    pub updated: BTreeMap<String, AttributeMap>,
}

impl ReplicatedChanges {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.created.is_empty() && self.updated.is_empty()
    }

    /// Merges another part of the same version range into this one
    pub fn absorb(&mut self, part: ReplicatedChanges) {
        self.removed.extend(part.removed);
        self.created.extend(part.created);
        for (name, values) in part.updated {
            self.updated.entry(name).or_default().extend(values);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_is_terminal() {
        let mut changes = TickChanges::default();
        changes.record_created("bullet_1", &Family::from("bullet"));
        changes.record_updated("bullet_1", Attribute::Position);
        changes.record_removed("bullet_1");
        changes.record_updated("bullet_1", Attribute::Velocity);

        assert!(changes.created.is_empty());
        assert!(changes.updated.is_empty());
        assert!(changes.removed.contains("bullet_1"));
    }

    #[test]
    fn test_merge_unions_attributes() {
        let mut first = TickChanges::default();
        first.record_updated("player_1", Attribute::Position);

        let mut later = TickChanges::default();
        later.record_updated("player_1", Attribute::Position);
        later.record_updated("player_1", Attribute::Health);

        first.merge(&later);
        let attributes = &first.updated["player_1"];
        assert_eq!(attributes.len(), 2);
        assert!(attributes.contains(&Attribute::Health));
    }

    #[test]
    fn test_entity_names() {
        let mut changes = TickChanges::default();
        changes.record_removed("a");
        changes.record_created("b", &Family::from("bullet"));
        changes.record_updated("b", Attribute::Position);
        let change_set = ChangeSet::from_changes(1, 2, changes);

        let names: Vec<&str> = change_set.entity_names().into_iter().collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
