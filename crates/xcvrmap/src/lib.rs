//! # xcvrmap
//!
//! Declarative decode/encode engine for the paged, bit-addressable register
//! maps of pluggable transceivers (CMIS, SFF-8472, SFF-8636).
//!
//! Fields are declared once per hardware ABI revision and collected into an
//! immutable [map::RegisterMap]. An [accessor::Accessor] reads and writes them
//! by name through a caller-supplied byte transport, merging partial-byte
//! writes with the bytes already on the device.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use xcvrmap::{
//!     accessor::Accessor,
//!     codes::{CodeTable, Codes},
//!     field::BitField,
//!     map::RegisterMap,
//!     number::CodeField,
//!     value::Value,
//! };
//!
//! let codes = Codes::new().with_table("IDENTIFIER", CodeTable::new([(0x18, "QSFP-DD")]));
//! let identifier = codes.table("IDENTIFIER").unwrap();
//! let map = RegisterMap::new(
//!     "CMIS 5.0",
//!     codes,
//!     vec![
//!         CodeField::byte("Identifier", 0, identifier).ro().into(),
//!         BitField::new("LowPwrRequestSW", 26, 4).into(),
//!     ],
//! )
//! .unwrap();
//!
//! let mut eeprom = vec![0u8; 128];
//! eeprom[0] = 0x18;
//! let reader = |offset: u64, len: usize| {
//!     let start = offset as usize;
//!     eeprom.get(start..start + len).map(<[u8]>::to_vec)
//! };
//! let writer = |_offset: u64, _data: &[u8]| true;
//!
//! let accessor = Accessor::new(Arc::new(map), reader, writer);
//! assert_eq!(
//!     accessor.read("Identifier").unwrap(),
//!     Some(Value::Str("QSFP-DD".to_string()))
//! );
//! assert!(accessor.write("LowPwrRequestSW", &Value::Bool(true)).unwrap());
//! ```

pub mod accessor;
pub mod bits;
pub mod codes;
pub mod errors;
pub mod field;
pub mod format;
pub mod group;
pub mod map;
pub mod number;
#[cfg(feature = "serde")]
pub mod serde;
pub mod text;
pub mod value;
