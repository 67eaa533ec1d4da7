//! The authoritative (server) or reconstructed (client) world
//!
//! All entity mutation goes through the registry. When tracking is enabled,
//! every mutation is recorded so the change tracker can commit it at the end
//! of the tick.

use crate::attribute::{Attribute, AttributeValue};
use crate::change_set::TickChanges;
use crate::entity::{Entity, EntityFactory, Family};
use crate::error::RegistryError;
use std::collections::HashMap;

/// Owner of every entity in one world
///
/// Entities are keyed by name. The registry is built with an
/// `EntityFactory` that seeds family defaults, so the same code path creates
/// entities spawned by game rules and entities announced by the server.
pub struct Registry {
    entities: HashMap<String, Entity>,
    factory: Box<dyn EntityFactory>,
    /// Mutations since the last drain, `None` when not tracking
    pending: Option<TickChanges>,
    name_counter: u64,
}

impl Registry {
    /// Creates an untracked registry, as used by clients
    pub fn new(factory: impl EntityFactory + 'static) -> Self {
        Self {
            entities: HashMap::new(),
            factory: Box::new(factory),
            pending: None,
            name_counter: 0,
        }
    }

    /// Creates a registry that records every mutation
    pub fn tracked(factory: impl EntityFactory + 'static) -> Self {
        let mut registry = Self::new(factory);
        registry.pending = Some(TickChanges::default());
        registry
    }

    /// Looks up an entity by name
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// Returns true if an entity with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    /// Iterates over all entities in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Returns a process-unique name of the form `<family>_<n>`
    pub fn generate_unique_name(&mut self, family: &Family) -> String {
        loop {
            self.name_counter += 1;
            let name = format!("{}_{}", family, self.name_counter);
            if !self.entities.contains_key(&name) {
                return name;
            }
        }
    }

    /// Spawns a new entity with a generated name
    pub fn spawn(&mut self, family: &Family) -> Result<String, RegistryError> {
        let name = self.generate_unique_name(family);
        self.create(&name, family)?;
        Ok(name)
    }

    /// Instantiates an entity through the factory
    ///
    /// When tracking, the creation is recorded together with every seeded
    /// attribute, so receivers get the initial values with the creation.
    pub fn create(&mut self, name: &str, family: &Family) -> Result<&Entity, RegistryError> {
        if self.entities.contains_key(name) {
            return Err(RegistryError::DuplicateEntity(name.to_string()));
        }
        let entity = self.factory.create(family, name)?;

        if let Some(pending) = self.pending.as_mut() {
            pending.record_created(name, family);
            for attribute in entity.attributes().keys() {
                pending.record_updated(name, *attribute);
            }
        }

        Ok(&*self.entities.entry(name.to_string()).or_insert(entity))
    }

    /// Removes an entity, returning it if it existed
    ///
    /// A recorded removal cancels any creation or update of the same entity
    /// recorded earlier in the tick.
    pub fn remove(&mut self, name: &str) -> Option<Entity> {
        let removed = self.entities.remove(name)?;
        if let Some(pending) = self.pending.as_mut() {
            pending.record_removed(name);
        }
        Some(removed)
    }

    /// Sets one attribute of an entity
    ///
    /// Fails with `NoSuchEntity` for an unknown name and `TypeMismatch` when
    /// the value does not have the attribute's declared type. Only
    /// successful writes are recorded.
    pub fn set(
        &mut self,
        name: &str,
        attribute: Attribute,
        value: AttributeValue,
    ) -> Result<(), RegistryError> {
        let entity = self
            .entities
            .get_mut(name)
            .ok_or_else(|| RegistryError::NoSuchEntity(name.to_string()))?;
        entity.set(attribute, value)?;

        if let Some(pending) = self.pending.as_mut() {
            pending.record_updated(name, attribute);
        }
        Ok(())
    }

    /// Removes every entity without recording anything
    pub fn clear(&mut self) {
        self.entities.clear();
    }

    /// Hands the mutations recorded so far to the caller
    pub fn drain_changes(&mut self) -> TickChanges {
        self.pending
            .as_mut()
            .map(std::mem::take)
            .unwrap_or_default()
    }
}
