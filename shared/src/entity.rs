//! Entities, families, and the factory that instantiates them

use crate::attribute::{Attribute, AttributeMap, AttributeValue, Vector2};
use crate::error::RegistryError;
use std::fmt;

/// Archetype tag of an entity, fixed at creation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Family(String);

impl Family {
    pub const PLAYER: &'static str = "player";
    pub const BULLET: &'static str = "bullet";
    pub const MAP: &'static str = "map";
    pub const HEALTH_KIT: &'static str = "healthkit";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Family {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A named bag of typed attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    name: String,
    family: Family,
    attributes: AttributeMap,
}

impl Entity {
    pub fn new(name: impl Into<String>, family: Family) -> Self {
        Self {
            name: name.into(),
            family,
            attributes: AttributeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> &Family {
        &self.family
    }

    pub fn get(&self, attribute: Attribute) -> Option<&AttributeValue> {
        self.attributes.get(&attribute)
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Sets a value after checking it against the declared type
    pub(crate) fn set(
        &mut self,
        attribute: Attribute,
        value: AttributeValue,
    ) -> Result<(), RegistryError> {
        if value.value_type() != attribute.value_type() {
            return Err(RegistryError::TypeMismatch {
                attribute,
                expected: attribute.value_type(),
            });
        }
        self.attributes.insert(attribute, value);
        Ok(())
    }

    /// Builder used by factories to seed initial values
    pub fn with(mut self, attribute: Attribute, value: AttributeValue) -> Self {
        if let Err(e) = self.set(attribute, value) {
            log::error!("Factory seeded {} with a bad value: {}", self.name, e);
        }
        self
    }
}

/// Instantiates entities for a family tag
///
/// Owned by game logic; the registry calls it both on the server when game
/// rules spawn something and on the client when a replicated creation
/// arrives.
pub trait EntityFactory: Send {
    fn create(&self, family: &Family, name: &str) -> Result<Entity, RegistryError>;
}

/// Factory that knows the families of the stock game
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEntityFactory;

impl EntityFactory for DefaultEntityFactory {
    fn create(&self, family: &Family, name: &str) -> Result<Entity, RegistryError> {
        let entity = Entity::new(name, family.clone());
        let entity = match family.as_str() {
            Family::PLAYER => entity
                .with(Attribute::Health, AttributeValue::Integer(100))
                .with(Attribute::Orientation, AttributeValue::Integer(1))
                .with(Attribute::Team, AttributeValue::Integer(0))
                .with(Attribute::Position, AttributeValue::Vector2(Vector2::default()))
                .with(Attribute::Velocity, AttributeValue::Vector2(Vector2::default()))
                .with(Attribute::ItemList, AttributeValue::EntityList(Vec::new())),
            Family::BULLET => entity
                .with(Attribute::Position, AttributeValue::Vector2(Vector2::default()))
                .with(Attribute::Velocity, AttributeValue::Vector2(Vector2::default())),
            Family::MAP => entity
                .with(Attribute::Width, AttributeValue::Integer(0))
                .with(Attribute::Height, AttributeValue::Integer(0))
                .with(Attribute::Tiles, AttributeValue::TileList(Vec::new())),
            Family::HEALTH_KIT => entity
                .with(Attribute::Position, AttributeValue::Vector2(Vector2::default()))
                .with(Attribute::Health, AttributeValue::Integer(25)),
            other => return Err(RegistryError::UnknownFamily(other.to_string())),
        };
        Ok(entity)
    }
}
