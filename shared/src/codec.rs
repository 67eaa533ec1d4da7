//! Binary wire codec
//!
//! All multi-byte fields are big-endian. Strings are a 4-byte byte count
//! followed by UTF-8 bytes, collections a 4-byte element count followed by
//! the elements. Attribute values are a 2-byte wire id followed by a payload
//! whose shape is given by the id's declared type.

use crate::attribute::{Attribute, AttributeMap, AttributeValue, Tile, ValueType, Vector2};
use crate::change_set::ReplicatedChanges;
use crate::entity::Family;
use crate::error::CodecError;
use crate::protocol::DEFAULT_BUFFER_SIZE;
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use log::warn;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;

/// Bounded encoder; never grows past its capacity
#[derive(Debug)]
pub struct WireWriter {
    buf: Vec<u8>,
    capacity: usize,
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl WireWriter {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(DEFAULT_BUFFER_SIZE)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Resets the writer so its allocation can be reused
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn reserve(&self, additional: usize) -> Result<(), CodecError> {
        let needed = self.buf.len() + additional;
        if needed > self.capacity {
            return Err(CodecError::BufferOverflow {
                needed,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn overflow(&self) -> CodecError {
        CodecError::BufferOverflow {
            needed: self.buf.len(),
            capacity: self.capacity,
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.reserve(1)?;
        self.buf.write_u8(value).map_err(|_| self.overflow())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), CodecError> {
        self.reserve(2)?;
        self.buf
            .write_u16::<NetworkEndian>(value)
            .map_err(|_| self.overflow())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.reserve(4)?;
        self.buf
            .write_u32::<NetworkEndian>(value)
            .map_err(|_| self.overflow())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), CodecError> {
        self.reserve(4)?;
        self.buf
            .write_i32::<NetworkEndian>(value)
            .map_err(|_| self.overflow())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.reserve(8)?;
        self.buf
            .write_u64::<NetworkEndian>(value)
            .map_err(|_| self.overflow())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), CodecError> {
        self.reserve(4)?;
        self.buf
            .write_f32::<NetworkEndian>(value)
            .map_err(|_| self.overflow())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_count(&mut self, count: usize) -> Result<(), CodecError> {
        let count = u32::try_from(count).map_err(|_| CodecError::BufferOverflow {
            needed: count,
            capacity: self.capacity,
        })?;
        self.write_u32(count)
    }

    pub fn write_string(&mut self, value: &str) -> Result<(), CodecError> {
        self.reserve(4 + value.len())?;
        self.write_count(value.len())?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_vector2(&mut self, value: Vector2) -> Result<(), CodecError> {
        self.write_f32(value.x)?;
        self.write_f32(value.y)
    }

    pub fn write_tile(&mut self, tile: &Tile) -> Result<(), CodecError> {
        self.write_i32(tile.x)?;
        self.write_i32(tile.y)?;
        self.write_i32(tile.kind)
    }

    pub fn write_names<'a>(
        &mut self,
        names: impl ExactSizeIterator<Item = &'a String>,
    ) -> Result<(), CodecError> {
        self.write_count(names.len())?;
        for name in names {
            self.write_string(name)?;
        }
        Ok(())
    }

    /// Writes one attribute, shaping the payload by the declared type
    pub fn write_attribute(
        &mut self,
        attribute: Attribute,
        value: &AttributeValue,
    ) -> Result<(), CodecError> {
        let mismatch = CodecError::TypeMismatch {
            attribute,
            expected: attribute.value_type(),
        };
        self.write_u16(attribute.wire_id())?;
        match (attribute.value_type(), value) {
            (ValueType::Integer, AttributeValue::Integer(v)) => self.write_i32(*v),
            (ValueType::Float, AttributeValue::Float(v)) => self.write_f32(*v),
            (ValueType::String, AttributeValue::String(v)) => self.write_string(v),
            (ValueType::Vector2, AttributeValue::Vector2(v)) => self.write_vector2(*v),
            (ValueType::EntityList, AttributeValue::EntityList(names)) => {
                self.write_names(names.iter())
            }
            (ValueType::TileList, AttributeValue::TileList(tiles)) => {
                self.write_count(tiles.len())?;
                for tile in tiles {
                    self.write_tile(tile)?;
                }
                Ok(())
            }
            _ => Err(mismatch),
        }
    }

    pub fn write_attributes(&mut self, attributes: &AttributeMap) -> Result<(), CodecError> {
        self.write_count(attributes.len())?;
        for (attribute, value) in attributes {
            self.write_attribute(*attribute, value)?;
        }
        Ok(())
    }

    /// Writes a change set: versions, then removed, created, updated groups
    pub fn write_changes(&mut self, changes: &ReplicatedChanges) -> Result<(), CodecError> {
        self.write_u32(changes.first_version)?;
        self.write_u32(changes.last_version)?;

        self.write_names(changes.removed.iter())?;

        self.write_count(changes.created.len())?;
        for (name, family) in &changes.created {
            self.write_string(name)?;
            self.write_string(family.as_str())?;
        }

        self.write_count(changes.updated.len())?;
        for (name, attributes) in &changes.updated {
            self.write_string(name)?;
            self.write_attributes(attributes)?;
        }
        Ok(())
    }
}

/// Decoder over a received datagram
pub struct WireReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> WireReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        let remaining = self.remaining();
        if remaining < needed {
            return Err(CodecError::Truncated {
                needed: needed - remaining,
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.ensure(1)?;
        self.cursor
            .read_u8()
            .map_err(|_| CodecError::Truncated { needed: 1 })
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.ensure(2)?;
        self.cursor
            .read_u16::<NetworkEndian>()
            .map_err(|_| CodecError::Truncated { needed: 2 })
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.ensure(4)?;
        self.cursor
            .read_u32::<NetworkEndian>()
            .map_err(|_| CodecError::Truncated { needed: 4 })
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.ensure(4)?;
        self.cursor
            .read_i32::<NetworkEndian>()
            .map_err(|_| CodecError::Truncated { needed: 4 })
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.ensure(8)?;
        self.cursor
            .read_u64::<NetworkEndian>()
            .map_err(|_| CodecError::Truncated { needed: 8 })
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        self.ensure(4)?;
        self.cursor
            .read_f32::<NetworkEndian>()
            .map_err(|_| CodecError::Truncated { needed: 4 })
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(len)?;
        let start = self.position();
        let bytes: &'a [u8] = *self.cursor.get_ref();
        self.cursor.set_position((start + len) as u64);
        Ok(&bytes[start..start + len])
    }

    /// Reads an element count, rejecting counts the remaining bytes cannot
    /// possibly hold
    pub fn read_count(&mut self, min_element_len: usize) -> Result<usize, CodecError> {
        let count = self.read_u32()? as usize;
        let needed = count.saturating_mul(min_element_len.max(1));
        self.ensure(needed)?;
        Ok(count)
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    pub fn read_vector2(&mut self) -> Result<Vector2, CodecError> {
        Ok(Vector2::new(self.read_f32()?, self.read_f32()?))
    }

    pub fn read_tile(&mut self) -> Result<Tile, CodecError> {
        Ok(Tile {
            x: self.read_i32()?,
            y: self.read_i32()?,
            kind: self.read_i32()?,
        })
    }

    pub fn read_names(&mut self) -> Result<Vec<String>, CodecError> {
        let count = self.read_count(4)?;
        (0..count).map(|_| self.read_string()).collect()
    }

    fn read_value(&mut self, value_type: ValueType) -> Result<AttributeValue, CodecError> {
        Ok(match value_type {
            ValueType::Integer => AttributeValue::Integer(self.read_i32()?),
            ValueType::Float => AttributeValue::Float(self.read_f32()?),
            ValueType::String => AttributeValue::String(self.read_string()?),
            ValueType::Vector2 => AttributeValue::Vector2(self.read_vector2()?),
            ValueType::EntityList => AttributeValue::EntityList(self.read_names()?),
            ValueType::TileList => {
                let count = self.read_count(12)?;
                let tiles = (0..count)
                    .map(|_| self.read_tile())
                    .collect::<Result<Vec<_>, _>>()?;
                AttributeValue::TileList(tiles)
            }
        })
    }

    /// Reads one attribute. `Ok(None)` means the id was unknown and its
    /// payload was skipped.
    pub fn read_attribute(&mut self) -> Result<Option<(Attribute, AttributeValue)>, CodecError> {
        let id = self.read_u16()?;
        match Attribute::from_wire_id(id) {
            Some(attribute) => {
                let value = self.read_value(attribute.value_type())?;
                Ok(Some((attribute, value)))
            }
            None => {
                let value_type =
                    ValueType::of_wire_id(id).ok_or(CodecError::UnknownValueType(id))?;
                self.read_value(value_type)?;
                warn!("Skipping unknown attribute {:#06x}", id);
                Ok(None)
            }
        }
    }

    pub fn read_attributes(&mut self) -> Result<AttributeMap, CodecError> {
        let count = self.read_count(2)?;
        let mut attributes = AttributeMap::new();
        for _ in 0..count {
            if let Some((attribute, value)) = self.read_attribute()? {
                attributes.insert(attribute, value);
            }
        }
        Ok(attributes)
    }

    /// Reads a change set, rejecting one that could never have been produced
    /// by a tracker: a reversed version range, or a removed entity that is
    /// also created or updated.
    pub fn read_changes(&mut self) -> Result<ReplicatedChanges, CodecError> {
        let first_version = self.read_u32()?;
        let last_version = self.read_u32()?;
        if first_version > last_version {
            return Err(CodecError::InconsistentChanges("has a reversed version range"));
        }

        let removed: BTreeSet<String> = self.read_names()?.into_iter().collect();

        let created_count = self.read_count(8)?;
        let mut created = BTreeMap::new();
        for _ in 0..created_count {
            let name = self.read_string()?;
            let family = Family::new(self.read_string()?);
            created.insert(name, family);
        }

        let updated_count = self.read_count(8)?;
        let mut updated = BTreeMap::new();
        for _ in 0..updated_count {
            let name = self.read_string()?;
            let attributes = self.read_attributes()?;
            updated.insert(name, attributes);
        }

        let revived = removed
            .iter()
            .any(|name| created.contains_key(name) || updated.contains_key(name));
        if revived {
            return Err(CodecError::InconsistentChanges(
                "creates or updates a removed entity",
            ));
        }

        Ok(ReplicatedChanges {
            first_version,
            last_version,
            removed,
            created,
            updated,
        })
    }
}

/// Encoded size of an attribute value including its id
pub fn attribute_len(value: &AttributeValue) -> usize {
    2 + match value {
        AttributeValue::Integer(_) | AttributeValue::Float(_) => 4,
        AttributeValue::String(v) => 4 + v.len(),
        AttributeValue::Vector2(_) => 8,
        AttributeValue::EntityList(names) => 4 + names.iter().map(|n| 4 + n.len()).sum::<usize>(),
        AttributeValue::TileList(tiles) => 4 + 12 * tiles.len(),
    }
}

pub fn removed_entry_len(name: &str) -> usize {
    4 + name.len()
}

pub fn created_entry_len(name: &str, family: &Family) -> usize {
    8 + name.len() + family.as_str().len()
}

pub fn updated_entry_len(name: &str, attributes: &AttributeMap) -> usize {
    8 + name.len() + attributes.values().map(attribute_len).sum::<usize>()
}

/// Versions plus the three group counts
pub const CHANGES_HEADER_LEN: usize = 20;
