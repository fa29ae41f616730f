//! Accessor: reads and writes fields by name through an injected transport.
//!
//! The transport is responsible for page selection and for making
//! "select page, then access" atomic with respect to other users of the
//! device. The accessor issues exactly one transport call per field access
//! (two for read-modify-write) and never retries.

use std::sync::Arc;

use log::{debug, warn};

use crate::{
    errors::{AccessError, EncodeError},
    field::{Field, RegisterField},
    map::RegisterMap,
    value::{Resolved, Value},
};

/// Reads raw bytes from the device's flat address space.
pub trait ByteReader {
    /// Returns exactly `len` bytes at `offset`, or `None` if the read failed.
    fn read_bytes(&self, offset: u64, len: usize) -> Option<Vec<u8>>;
}

/// Writes raw bytes to the device's flat address space.
pub trait ByteWriter {
    /// Returns whether the write succeeded.
    fn write_bytes(&self, offset: u64, data: &[u8]) -> bool;
}

impl<F> ByteReader for F
where
    F: Fn(u64, usize) -> Option<Vec<u8>>,
{
    fn read_bytes(&self, offset: u64, len: usize) -> Option<Vec<u8>> {
        self(offset, len)
    }
}

impl<F> ByteWriter for F
where
    F: Fn(u64, &[u8]) -> bool,
{
    fn write_bytes(&self, offset: u64, data: &[u8]) -> bool {
        self(offset, data)
    }
}

/// Field-level access to one device.
pub struct Accessor<R, W> {
    map: Arc<RegisterMap>,
    reader: R,
    writer: W,
}

impl<R, W> Accessor<R, W>
where
    R: ByteReader,
    W: ByteWriter,
{
    pub fn new(map: Arc<RegisterMap>, reader: R, writer: W) -> Self {
        Accessor {
            map,
            reader,
            writer,
        }
    }

    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    fn field(&self, name: &str) -> Result<&Field, AccessError> {
        self.map
            .get_field(name)
            .ok_or_else(|| AccessError::UnknownField(name.to_string()))
    }

    /// Reads and decodes `name` without dependency context.
    ///
    /// `Ok(None)` means the transport could not read the field.
    pub fn read(&self, name: &str) -> Result<Option<Value>, AccessError> {
        self.read_with(name, &Resolved::new())
    }

    /// Reads and decodes `name`, supplying already decoded dependency values.
    pub fn read_with(&self, name: &str, deps: &Resolved) -> Result<Option<Value>, AccessError> {
        let field = self.field(name)?;
        debug!(
            "read {} at {:#x} ({} bytes)",
            name,
            field.offset(),
            field.size()
        );

        let Some(raw) = self.reader.read_bytes(field.offset(), field.size()) else {
            warn!("read of {} at {:#x} failed", name, field.offset());
            return Ok(None);
        };

        Ok(Some(field.decode(&raw, deps)?))
    }

    /// Reads `names` in order, feeding every decoded value into the context
    /// of the reads that follow.
    ///
    /// Group values contribute their members as well as themselves. Fields
    /// the transport could not read are left out of the result.
    pub fn read_sequence(&self, names: &[&str]) -> Result<Resolved, AccessError> {
        let mut resolved = Resolved::new();
        for name in names {
            if let Some(value) = self.read_with(name, &resolved)? {
                absorb(&mut resolved, name, value);
            }
        }

        Ok(resolved)
    }

    /// Encodes `value` into `name` and writes it.
    ///
    /// Read-only and derived fields fail before any transport access. For fields that
    /// share bytes with other bits, and for group values naming only some
    /// members, the current bytes are read first; if that read fails the
    /// write is abandoned and `Ok(false)` returned.
    pub fn write(&self, name: &str, value: &Value) -> Result<bool, AccessError> {
        let field = self.field(name)?;
        if field.read_only() {
            return Err(EncodeError::ReadOnly(name.to_string()).into());
        }
        if field.is_derived() {
            return Err(EncodeError::Derived(name.to_string()).into());
        }

        let encoded = if field.read_before_write() || partial_group(field, value) {
            let Some(current) = self.reader.read_bytes(field.offset(), field.size()) else {
                warn!(
                    "read before write of {} at {:#x} failed",
                    name,
                    field.offset()
                );
                return Ok(false);
            };
            field.encode(value, Some(&current))?
        } else {
            field.encode(value, None)?
        };

        debug!("write {} at {:#x}: {:02x?}", name, field.offset(), encoded);
        let ok = self.writer.write_bytes(field.offset(), &encoded);
        if !ok {
            warn!("write of {} at {:#x} failed", name, field.offset());
        }

        Ok(ok)
    }

    /// Reads raw bytes, bypassing the map.
    pub fn read_raw(&self, offset: u64, len: usize) -> Option<Vec<u8>> {
        self.reader.read_bytes(offset, len)
    }

    /// Writes raw bytes, bypassing the map.
    pub fn write_raw(&self, offset: u64, data: &[u8]) -> bool {
        self.writer.write_bytes(offset, data)
    }
}

fn partial_group(field: &Field, value: &Value) -> bool {
    field
        .as_group()
        .is_some_and(|group| group.is_partial(value))
}

fn absorb(resolved: &mut Resolved, name: &str, value: Value) {
    if let Value::Group(members) = &value {
        for (member, inner) in members {
            absorb(resolved, member, inner.clone());
        }
    }

    resolved.insert(name.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codes::Codes,
        field::BitField,
        format::NumberFormat,
        group::GroupField,
        number::{Derivation, NumberField},
    };
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;

    struct Eeprom {
        bytes: RefCell<Vec<u8>>,
        writes: RefCell<usize>,
    }

    impl ByteReader for &Eeprom {
        fn read_bytes(&self, offset: u64, len: usize) -> Option<Vec<u8>> {
            let start = offset as usize;
            self.bytes.borrow().get(start..start + len).map(<[u8]>::to_vec)
        }
    }

    impl ByteWriter for &Eeprom {
        fn write_bytes(&self, offset: u64, data: &[u8]) -> bool {
            let start = offset as usize;
            *self.writes.borrow_mut() += 1;
            match self.bytes.borrow_mut().get_mut(start..start + data.len()) {
                Some(target) => {
                    target.copy_from_slice(data);
                    true
                }
                None => false,
            }
        }
    }

    fn map() -> Arc<RegisterMap> {
        Arc::new(
            RegisterMap::new(
                "test",
                Codes::new(),
                vec![
                    NumberField::new("Id", 0, NumberFormat::U8).ro().into(),
                    BitField::new("TxDisable", 1, 1).into(),
                    NumberField::new("Far", 100, NumberFormat::U16).into(),
                ],
            )
            .unwrap(),
        )
    }

    fn eeprom() -> Eeprom {
        Eeprom {
            bytes: RefCell::new(vec![0x18, 0x01, 0x00, 0x00]),
            writes: RefCell::new(0),
        }
    }

    #[test]
    fn test_read() {
        let device = eeprom();
        let accessor = Accessor::new(map(), &device, &device);
        assert_eq!(accessor.read("Id").unwrap(), Some(Value::UInt(0x18)));
        assert_eq!(accessor.read("TxDisable").unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn test_read_unavailable() {
        let device = eeprom();
        let accessor = Accessor::new(map(), &device, &device);
        assert_eq!(accessor.read("Far").unwrap(), None);
    }

    #[test]
    fn test_unknown_field() {
        let device = eeprom();
        let accessor = Accessor::new(map(), &device, &device);
        assert_eq!(
            accessor.read("Nope").unwrap_err(),
            AccessError::UnknownField("Nope".to_string())
        );
    }

    #[test]
    fn test_write_read_modify_write() {
        let device = eeprom();
        let accessor = Accessor::new(map(), &device, &device);
        assert!(accessor.write("TxDisable", &Value::Bool(true)).unwrap());
        assert_eq!(device.bytes.borrow()[1], 0x03);
        assert_eq!(accessor.read("TxDisable").unwrap(), Some(Value::Bool(true)));
    }

    #[test]
    fn test_write_read_only() {
        let device = eeprom();
        let accessor = Accessor::new(map(), &device, &device);
        assert_eq!(
            accessor.write("Id", &Value::UInt(1)).unwrap_err(),
            AccessError::Encode(EncodeError::ReadOnly("Id".to_string()))
        );
        assert_eq!(*device.writes.borrow(), 0);
        assert_eq!(device.bytes.borrow()[0], 0x18);
    }

    #[test]
    fn test_partial_group_write_keeps_other_members() {
        let map = RegisterMap::new(
            "group",
            Codes::new(),
            vec![
                GroupField::new(
                    "Thresholds",
                    vec![
                        NumberField::new("High", 0, NumberFormat::U8).into(),
                        NumberField::new("Low", 1, NumberFormat::U8).into(),
                    ],
                )
                .into(),
            ],
        )
        .unwrap();
        let device = eeprom();
        let accessor = Accessor::new(Arc::new(map), &device, &device);

        let value = Value::Group(BTreeMap::from([("Low".to_string(), Value::UInt(9))]));
        assert!(accessor.write("Thresholds", &value).unwrap());
        assert_eq!(device.bytes.borrow()[..2], [0x18, 0x09]);
    }

    #[test]
    fn test_nested_partial_group_write_keeps_siblings() {
        let map = RegisterMap::new(
            "nested",
            Codes::new(),
            vec![
                GroupField::new(
                    "Outer",
                    vec![
                        GroupField::new(
                            "Inner",
                            vec![
                                NumberField::new("A", 0, NumberFormat::U8).into(),
                                NumberField::new("B", 1, NumberFormat::U8).into(),
                            ],
                        )
                        .into(),
                        NumberField::new("C", 2, NumberFormat::U8).into(),
                    ],
                )
                .into(),
            ],
        )
        .unwrap();
        let device = Eeprom {
            bytes: RefCell::new(vec![11, 22, 33]),
            writes: RefCell::new(0),
        };
        let accessor = Accessor::new(Arc::new(map), &device, &device);

        let value = Value::Group(BTreeMap::from([
            (
                "Inner".to_string(),
                Value::Group(BTreeMap::from([("A".to_string(), Value::UInt(9))])),
            ),
            ("C".to_string(), Value::UInt(7)),
        ]));
        assert!(accessor.write("Outer", &value).unwrap());
        assert_eq!(*device.bytes.borrow(), vec![9, 22, 7]);
    }

    #[test]
    fn test_write_derived_before_any_io() {
        let map = RegisterMap::new(
            "derived",
            Codes::new(),
            vec![
                NumberField::new("CableLength", 0, NumberFormat::U8)
                    .bits("CableBaseLength", 0, 6)
                    .derive(Derivation::multiplier("CableLengthMultiplier"))
                    .into(),
            ],
        )
        .unwrap();
        let calls = Cell::new(0);
        let reader = |_offset: u64, len: usize| {
            calls.set(calls.get() + 1);
            Some(vec![0; len])
        };
        let writer = |_offset: u64, _data: &[u8]| {
            calls.set(calls.get() + 1);
            true
        };
        let accessor = Accessor::new(Arc::new(map), reader, writer);

        assert_eq!(
            accessor.write("CableLength", &Value::Float(50.0)).unwrap_err(),
            AccessError::Encode(EncodeError::Derived("CableLength".to_string()))
        );
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_closure_transport() {
        let reader = |_offset: u64, len: usize| Some(vec![0x18; len]);
        let writer = |_offset: u64, _data: &[u8]| false;
        let accessor = Accessor::new(map(), reader, writer);
        assert_eq!(accessor.read("Id").unwrap(), Some(Value::UInt(0x18)));
        assert!(!accessor.write("Far", &Value::UInt(7)).unwrap());
        assert_eq!(accessor.read_raw(5, 2), Some(vec![0x18, 0x18]));
        assert!(!accessor.write_raw(5, &[1]));
    }
}
