//! Field declarations: the [RegisterField] capability and the [Field] taxonomy.
//!
//! A field is a named, addressed, typed window into a register map. Every
//! field knows its absolute byte offset and size, whether it may be written,
//! and how to turn raw bytes into a [Value] and back. Fields are plain
//! immutable descriptors; [crate::map::RegisterMap::new] validates them.

use std::sync::Arc;

use crate::{
    bits,
    errors::{DecodeError, DefinitionError, EncodeError},
    group::GroupField,
    number::{CodeField, FixedPointField, NumberField},
    text::{DateField, HexField, StringField},
    value::{Resolved, Value},
};

/// How a field must be written back to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The field owns every bit of its byte range; encode needs no current state.
    Direct,
    /// The field shares its bytes with other bits; the current bytes must be
    /// read first and merged.
    ReadModifyWrite,
}

/// Capability shared by every field kind.
pub trait RegisterField {
    fn name(&self) -> &str;

    /// Absolute byte address of the first byte.
    fn offset(&self) -> u64;

    /// Length in bytes. Bit fields report 1.
    fn size(&self) -> usize;

    fn read_only(&self) -> bool;

    /// Bits of the field's range it actually occupies, `None` if it owns the whole range.
    fn bitmask(&self) -> Option<u64> {
        None
    }

    /// Names of fields whose decoded values [RegisterField::decode] needs.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    fn write_mode(&self) -> WriteMode;

    fn read_before_write(&self) -> bool {
        self.write_mode() == WriteMode::ReadModifyWrite
    }

    /// Decodes `raw`, which starts at [RegisterField::offset] and holds at
    /// least [RegisterField::size] bytes. `deps` carries already decoded
    /// values for [RegisterField::dependencies].
    fn decode(&self, raw: &[u8], deps: &Resolved) -> Result<Value, DecodeError>;

    /// Encodes `value` into the bytes to write at [RegisterField::offset].
    /// `current` holds the bytes presently stored there and is required for
    /// [WriteMode::ReadModifyWrite] fields.
    fn encode(&self, value: &Value, current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError>;
}

/// Fails with [DecodeError::ShortRead] if `raw` cannot hold `size` bytes.
pub(crate) fn ensure_len(name: &str, raw: &[u8], size: usize) -> Result<(), DecodeError> {
    if raw.len() < size {
        return Err(DecodeError::ShortRead {
            field: name.to_string(),
            expected: size,
            actual: raw.len(),
        });
    }

    Ok(())
}

pub(crate) fn ensure_writable(name: &str, read_only: bool) -> Result<(), EncodeError> {
    if read_only {
        return Err(EncodeError::ReadOnly(name.to_string()));
    }

    Ok(())
}

/// Current bytes for a read-modify-write encode, checked against `size`.
pub(crate) fn require_current<'a>(
    name: &str,
    current: Option<&'a [u8]>,
    size: usize,
) -> Result<&'a [u8], EncodeError> {
    match current {
        Some(bytes) if bytes.len() >= size => Ok(&bytes[..size]),
        _ => Err(EncodeError::MissingCurrent(name.to_string())),
    }
}

pub(crate) fn type_mismatch(name: &str, value: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        field: name.to_string(),
        found: value.kind(),
    }
}

/// Single bit at `bitpos` (0 = least significant) of one byte. Decodes to a bool.
#[derive(Debug, Clone, PartialEq)]
pub struct BitField {
    pub name: String,
    pub offset: u64,
    pub bitpos: u8,
    pub read_only: bool,
}

impl BitField {
    pub fn new(name: impl Into<String>, offset: u64, bitpos: u8) -> Self {
        BitField {
            name: name.into(),
            offset,
            bitpos,
            read_only: false,
        }
    }

    /// Marks the field read-only.
    pub fn ro(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        if self.bitpos >= 8 {
            return Err(DefinitionError::InvalidBitRange {
                name: self.name.clone(),
                bitpos: self.bitpos,
                width: 1,
                limit: 8,
            });
        }

        Ok(())
    }
}

impl RegisterField for BitField {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> usize {
        1
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn bitmask(&self) -> Option<u64> {
        Some(bits::mask(self.bitpos as u32, 1))
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::ReadModifyWrite
    }

    fn decode(&self, raw: &[u8], _deps: &Resolved) -> Result<Value, DecodeError> {
        ensure_len(&self.name, raw, 1)?;
        Ok(Value::Bool(
            bits::extract(raw[0] as u64, self.bitpos as u32, 1) == 1,
        ))
    }

    fn encode(&self, value: &Value, current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(&self.name, self.read_only)?;
        let set = value
            .as_bool()
            .ok_or_else(|| type_mismatch(&self.name, value))?;
        let current = require_current(&self.name, current, 1)?;

        let merged = bits::merge(current[0] as u64, self.bitpos as u32, 1, set as u64);
        Ok(vec![merged as u8])
    }
}

/// `width` contiguous bits (1..=8) starting at `bitpos` of one byte.
///
/// Decodes to an unsigned integer.
#[derive(Debug, Clone, PartialEq)]
pub struct BitsField {
    pub name: String,
    pub offset: u64,
    pub bitpos: u8,
    pub width: u8,
    pub read_only: bool,
}

impl BitsField {
    pub fn new(name: impl Into<String>, offset: u64, bitpos: u8, width: u8) -> Self {
        BitsField {
            name: name.into(),
            offset,
            bitpos,
            width,
            read_only: false,
        }
    }

    pub fn ro(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn validate(&self) -> Result<(), DefinitionError> {
        if self.width == 0 || self.bitpos as u32 + self.width as u32 > 8 {
            return Err(DefinitionError::InvalidBitRange {
                name: self.name.clone(),
                bitpos: self.bitpos,
                width: self.width,
                limit: 8,
            });
        }

        Ok(())
    }
}

impl RegisterField for BitsField {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> usize {
        1
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn bitmask(&self) -> Option<u64> {
        Some(bits::mask(self.bitpos as u32, self.width as u32))
    }

    fn write_mode(&self) -> WriteMode {
        if self.bitpos == 0 && self.width == 8 {
            WriteMode::Direct
        } else {
            WriteMode::ReadModifyWrite
        }
    }

    fn decode(&self, raw: &[u8], _deps: &Resolved) -> Result<Value, DecodeError> {
        ensure_len(&self.name, raw, 1)?;
        Ok(Value::UInt(bits::extract(
            raw[0] as u64,
            self.bitpos as u32,
            self.width as u32,
        )))
    }

    fn encode(&self, value: &Value, current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(&self.name, self.read_only)?;
        let v = value
            .as_u64()
            .ok_or_else(|| type_mismatch(&self.name, value))?;
        if v > bits::max_value(self.width as u32) {
            return Err(EncodeError::OutOfRange(self.name.clone()));
        }

        let base = match self.write_mode() {
            WriteMode::Direct => 0,
            WriteMode::ReadModifyWrite => require_current(&self.name, current, 1)?[0] as u64,
        };

        let merged = bits::merge(base, self.bitpos as u32, self.width as u32, v);
        Ok(vec![merged as u8])
    }
}

/// Every field kind a register map can declare.
#[derive(Debug, Clone)]
pub enum Field {
    Bit(BitField),
    Bits(BitsField),
    Number(NumberField),
    FixedPoint(FixedPointField),
    String(StringField),
    Date(DateField),
    Code(CodeField),
    Hex(HexField),
    Group(GroupField),
}

macro_rules! dispatch {
    ($self:ident, $f:ident => $body:expr) => {
        match $self {
            Field::Bit($f) => $body,
            Field::Bits($f) => $body,
            Field::Number($f) => $body,
            Field::FixedPoint($f) => $body,
            Field::String($f) => $body,
            Field::Date($f) => $body,
            Field::Code($f) => $body,
            Field::Hex($f) => $body,
            Field::Group($f) => $body,
        }
    };
}

impl Field {
    /// Fields nested directly inside this one: group children, or the named
    /// bit sub-fields of a number.
    pub fn members(&self) -> &[Arc<Field>] {
        match self {
            Field::Group(group) => group.fields(),
            Field::Number(number) => number.sub_fields(),
            Field::FixedPoint(number) => number.inner().sub_fields(),
            Field::Code(code) => code.inner().sub_fields(),
            Field::Bit(_) | Field::Bits(_) | Field::String(_) | Field::Date(_) | Field::Hex(_) => {
                &[]
            }
        }
    }

    /// Checks the declaration of this field and everything nested in it.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        match self {
            Field::Bit(f) => f.validate(),
            Field::Bits(f) => f.validate(),
            Field::Number(f) => f.validate(),
            Field::FixedPoint(f) => f.validate(),
            Field::String(f) => f.validate(),
            Field::Date(f) => f.validate(),
            Field::Code(f) => f.validate(),
            Field::Hex(f) => f.validate(),
            Field::Group(f) => f.validate(),
        }
    }

    /// True for numbers decoded through a [crate::number::Derivation]. These cannot be encoded.
    pub fn is_derived(&self) -> bool {
        matches!(self, Field::Number(number) if number.derivation().is_some())
    }

    pub fn as_group(&self) -> Option<&GroupField> {
        match self {
            Field::Group(group) => Some(group),
            _ => None,
        }
    }
}

impl RegisterField for Field {
    fn name(&self) -> &str {
        dispatch!(self, f => f.name())
    }

    fn offset(&self) -> u64 {
        dispatch!(self, f => f.offset())
    }

    fn size(&self) -> usize {
        dispatch!(self, f => f.size())
    }

    fn read_only(&self) -> bool {
        dispatch!(self, f => f.read_only())
    }

    fn bitmask(&self) -> Option<u64> {
        dispatch!(self, f => f.bitmask())
    }

    fn dependencies(&self) -> &[String] {
        dispatch!(self, f => f.dependencies())
    }

    fn write_mode(&self) -> WriteMode {
        dispatch!(self, f => f.write_mode())
    }

    fn decode(&self, raw: &[u8], deps: &Resolved) -> Result<Value, DecodeError> {
        dispatch!(self, f => f.decode(raw, deps))
    }

    fn encode(&self, value: &Value, current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        dispatch!(self, f => f.encode(value, current))
    }
}

macro_rules! impl_from_field {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Field {
                fn from(value: $ty) -> Self {
                    Field::$variant(value)
                }
            }
        )*
    };
}

impl_from_field!(
    Bit(BitField),
    Bits(BitsField),
    Number(NumberField),
    FixedPoint(FixedPointField),
    String(StringField),
    Date(DateField),
    Code(CodeField),
    Hex(HexField),
    Group(GroupField),
);
