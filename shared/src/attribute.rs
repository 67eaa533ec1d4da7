//! Attribute schema: the typed fields an entity may carry
//!
//! Each attribute has a stable 16-bit wire id declared in a fixed table. The
//! top four bits of the id hold the value-type code, which lets a decoder
//! skip the payload of an id it has never heard of.

use std::collections::BTreeMap;

/// Shift applied to a value-type code inside a wire id
const TYPE_SHIFT: u16 = 12;

/// Declared value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Float,
    String,
    Vector2,
    EntityList,
    TileList,
}

impl ValueType {
    pub const fn code(self) -> u16 {
        match self {
            ValueType::Integer => 1,
            ValueType::Float => 2,
            ValueType::String => 3,
            ValueType::Vector2 => 4,
            ValueType::EntityList => 5,
            ValueType::TileList => 6,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(ValueType::Integer),
            2 => Some(ValueType::Float),
            3 => Some(ValueType::String),
            4 => Some(ValueType::Vector2),
            5 => Some(ValueType::EntityList),
            6 => Some(ValueType::TileList),
            _ => None,
        }
    }

    /// Value type encoded in the high bits of a wire id
    pub fn of_wire_id(id: u16) -> Option<Self> {
        Self::from_code(id >> TYPE_SHIFT)
    }
}

const fn wire_id(value_type: ValueType, index: u16) -> u16 {
    (value_type.code() << TYPE_SHIFT) | index
}

/// Every field an entity can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Attribute {
    Height,
    Width,
    Health,
    Orientation,
    Team,
    Rotation,
    PlayerName,
    Position,
    Velocity,
    Cursor,
    ItemList,
    Tiles,
}

impl Attribute {
    pub const ALL: [Attribute; 12] = [
        Attribute::Height,
        Attribute::Width,
        Attribute::Health,
        Attribute::Orientation,
        Attribute::Team,
        Attribute::Rotation,
        Attribute::PlayerName,
        Attribute::Position,
        Attribute::Velocity,
        Attribute::Cursor,
        Attribute::ItemList,
        Attribute::Tiles,
    ];

    /// Stable identifier written on the wire. Never renumber an entry.
    pub const fn wire_id(self) -> u16 {
        match self {
            Attribute::Height => wire_id(ValueType::Integer, 1),
            Attribute::Width => wire_id(ValueType::Integer, 2),
            Attribute::Health => wire_id(ValueType::Integer, 3),
            Attribute::Orientation => wire_id(ValueType::Integer, 4),
            Attribute::Team => wire_id(ValueType::Integer, 5),
            Attribute::Rotation => wire_id(ValueType::Float, 1),
            Attribute::PlayerName => wire_id(ValueType::String, 1),
            Attribute::Position => wire_id(ValueType::Vector2, 1),
            Attribute::Velocity => wire_id(ValueType::Vector2, 2),
            Attribute::Cursor => wire_id(ValueType::Vector2, 3),
            Attribute::ItemList => wire_id(ValueType::EntityList, 1),
            Attribute::Tiles => wire_id(ValueType::TileList, 1),
        }
    }

    pub const fn value_type(self) -> ValueType {
        match self {
            Attribute::Height
            | Attribute::Width
            | Attribute::Health
            | Attribute::Orientation
            | Attribute::Team => ValueType::Integer,
            Attribute::Rotation => ValueType::Float,
            Attribute::PlayerName => ValueType::String,
            Attribute::Position | Attribute::Velocity | Attribute::Cursor => ValueType::Vector2,
            Attribute::ItemList => ValueType::EntityList,
            Attribute::Tiles => ValueType::TileList,
        }
    }

    pub fn from_wire_id(id: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|attribute| attribute.wire_id() == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn add(self, other: Vector2) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }
}

/// A single map tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
    pub kind: i32,
}

/// A value held by an attribute
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Integer(i32),
    Float(f32),
    String(String),
    Vector2(Vector2),
    EntityList(Vec<String>),
    TileList(Vec<Tile>),
}

impl AttributeValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            AttributeValue::Integer(_) => ValueType::Integer,
            AttributeValue::Float(_) => ValueType::Float,
            AttributeValue::String(_) => ValueType::String,
            AttributeValue::Vector2(_) => ValueType::Vector2,
            AttributeValue::EntityList(_) => ValueType::EntityList,
            AttributeValue::TileList(_) => ValueType::TileList,
        }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self {
            AttributeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vector2> {
        match self {
            AttributeValue::Vector2(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }
}

pub type AttributeMap = BTreeMap<Attribute, AttributeValue>;
