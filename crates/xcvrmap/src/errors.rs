//! Error types for map construction, field decode/encode and register access.

use thiserror::Error;

/// Errors produced while declaring fields or building a [crate::map::RegisterMap].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    /// Bit range does not fit in a single byte (or in the number it belongs to).
    #[error("field `{name}`: {width} bits at position {bitpos} do not fit in {limit} bits")]
    InvalidBitRange {
        name: String,
        bitpos: u8,
        width: u8,
        limit: u32,
    },
    /// Field has a zero or otherwise unusable byte size.
    #[error("field `{name}`: invalid size {size}")]
    InvalidFieldSize { name: String, size: usize },
    /// Group declared without children.
    #[error("group `{0}` has no children")]
    EmptyGroup(String),
    /// Two declarations share a name.
    #[error("duplicate field name `{0}`")]
    DuplicateField(String),
    /// A code field refers to a table that is not part of the map's code set.
    #[error("unknown code table `{0}`")]
    UnknownCodeTable(String),
    /// Scale is zero or non-finite.
    #[error("field `{0}`: scale must be finite and non-zero")]
    InvalidScale(String),
    /// Declared number format cannot back this field kind.
    #[error("field `{name}`: unsupported format {format}")]
    UnsupportedFormat { name: String, format: String },
}

/// Errors produced when decoding raw bytes into a [crate::value::Value].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the field size were supplied.
    #[error("field `{field}`: expected {expected} bytes, got {actual}")]
    ShortRead {
        field: String,
        expected: usize,
        actual: usize,
    },
    /// A dependency value was not present in the resolved context.
    #[error("field `{field}`: missing dependency `{dependency}`")]
    MissingDependency { field: String, dependency: String },
    /// A dependency value was present but could not be used as a number.
    #[error("field `{field}`: dependency `{dependency}` is not numeric")]
    NonNumericDependency { field: String, dependency: String },
}

/// Errors produced when encoding a [crate::value::Value] into raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field `{0}` is read-only")]
    ReadOnly(String),
    /// A read-modify-write field was encoded without the current bytes.
    #[error("field `{0}`: current bytes are required to merge partial bits")]
    MissingCurrent(String),
    /// The value variant does not fit the field kind.
    #[error("field `{field}`: cannot encode {found} value")]
    TypeMismatch { field: String, found: &'static str },
    /// The value does not fit the field width.
    #[error("field `{0}`: value out of range")]
    OutOfRange(String),
    /// The value is of the right kind but malformed (non-ASCII text, bad hex, unknown label).
    #[error("field `{field}`: invalid value: {reason}")]
    InvalidValue { field: String, reason: String },
    /// The field decodes through a dependency formula and cannot be inverted.
    #[error("field `{0}` is derived from other fields and cannot be encoded")]
    Derived(String),
    /// A group value names a member the group does not contain.
    #[error("group `{group}` has no member `{member}`")]
    UnknownMember { group: String, member: String },
}

/// Errors surfaced by [crate::accessor::Accessor].
///
/// Transport failures are not errors: they show up as `Ok(None)` on read and
/// `Ok(false)` on write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}
