//! Binary number formats used by byte-range fields.

use std::fmt;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order of a multi-byte number. Transceiver maps are big-endian almost everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Primitive representation of a number stored in the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repr {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl Repr {
    /// Width in bytes.
    pub fn width(self) -> usize {
        match self {
            Repr::U8 | Repr::I8 => 1,
            Repr::U16 | Repr::I16 => 2,
            Repr::U32 | Repr::I32 | Repr::F32 => 4,
            Repr::U64 | Repr::I64 | Repr::F64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Repr::I8 | Repr::I16 | Repr::I32 | Repr::I64 | Repr::F32 | Repr::F64
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Repr::F32 | Repr::F64)
    }
}

/// A raw number as it comes off the wire, before scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawNumber {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl RawNumber {
    pub fn as_f64(self) -> f64 {
        match self {
            RawNumber::Unsigned(v) => v as f64,
            RawNumber::Signed(v) => v as f64,
            RawNumber::Float(v) => v,
        }
    }
}

/// Declared layout of a number: representation plus byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub repr: Repr,
    pub endian: Endian,
}

impl NumberFormat {
    pub const U8: NumberFormat = NumberFormat::be(Repr::U8);
    pub const I8: NumberFormat = NumberFormat::be(Repr::I8);
    pub const U16: NumberFormat = NumberFormat::be(Repr::U16);
    pub const I16: NumberFormat = NumberFormat::be(Repr::I16);
    pub const U32: NumberFormat = NumberFormat::be(Repr::U32);
    pub const I32: NumberFormat = NumberFormat::be(Repr::I32);
    pub const U64: NumberFormat = NumberFormat::be(Repr::U64);
    pub const F32: NumberFormat = NumberFormat::be(Repr::F32);

    /// Big-endian format.
    pub const fn be(repr: Repr) -> Self {
        NumberFormat {
            repr,
            endian: Endian::Big,
        }
    }

    /// Little-endian format.
    pub const fn le(repr: Repr) -> Self {
        NumberFormat {
            repr,
            endian: Endian::Little,
        }
    }

    pub fn width(&self) -> usize {
        self.repr.width()
    }

    /// Reads the raw bits of the number as an unsigned integer, honouring byte order.
    ///
    /// `data` must hold at least `width()` bytes.
    pub fn unpack_bits(&self, data: &[u8]) -> u64 {
        let width = self.width();
        match self.endian {
            Endian::Big => BigEndian::read_uint(data, width),
            Endian::Little => LittleEndian::read_uint(data, width),
        }
    }

    /// Writes the low `width()` bytes of `bits` in the declared byte order.
    pub fn pack_bits(&self, bits: u64) -> Vec<u8> {
        let width = self.width();
        let bits = bits & crate::bits::max_value((width * 8) as u32);
        let mut out = vec![0u8; width];
        match self.endian {
            Endian::Big => BigEndian::write_uint(&mut out, bits, width),
            Endian::Little => LittleEndian::write_uint(&mut out, bits, width),
        }
        out
    }

    /// Interprets raw bits according to the representation.
    pub fn interpret(&self, bits: u64) -> RawNumber {
        match self.repr {
            Repr::U8 | Repr::U16 | Repr::U32 | Repr::U64 => RawNumber::Unsigned(bits),
            Repr::I8 => RawNumber::Signed(bits as u8 as i8 as i64),
            Repr::I16 => RawNumber::Signed(bits as u16 as i16 as i64),
            Repr::I32 => RawNumber::Signed(bits as u32 as i32 as i64),
            Repr::I64 => RawNumber::Signed(bits as i64),
            Repr::F32 => RawNumber::Float(f32::from_bits(bits as u32) as f64),
            Repr::F64 => RawNumber::Float(f64::from_bits(bits)),
        }
    }

    /// Unpacks `data` into a raw number.
    pub fn unpack(&self, data: &[u8]) -> RawNumber {
        self.interpret(self.unpack_bits(data))
    }

    /// Converts `value` to the raw bit pattern of this format.
    ///
    /// Integer formats round to the nearest integer. Returns `None` when the
    /// value does not fit.
    pub fn to_bits(&self, value: f64) -> Option<u64> {
        if !value.is_finite() {
            return None;
        }

        match self.repr {
            Repr::F32 => Some((value as f32).to_bits() as u64),
            Repr::F64 => Some(value.to_bits()),
            repr => {
                let rounded = value.round();
                let bits = (repr.width() * 8) as u32;
                // Bounds are exclusive powers of two, exact in f64 even for 64-bit formats.
                if repr.is_signed() {
                    let limit = 2f64.powi(bits as i32 - 1);
                    if rounded < -limit || rounded >= limit {
                        return None;
                    }
                    Some((rounded as i64 as u64) & crate::bits::max_value(bits))
                } else {
                    let limit = 2f64.powi(bits as i32);
                    if rounded < 0.0 || rounded >= limit {
                        return None;
                    }
                    Some(rounded as u64)
                }
            }
        }
    }

    /// Integer counterpart of [Self::to_bits] that avoids float precision loss for 64-bit values.
    pub fn int_to_bits(&self, value: i128) -> Option<u64> {
        let bits = (self.width() * 8) as u32;
        match self.repr {
            Repr::F32 | Repr::F64 => self.to_bits(value as f64),
            repr if repr.is_signed() => {
                let min = -(1i128 << (bits - 1));
                let max = (1i128 << (bits - 1)) - 1;
                if value < min || value > max {
                    return None;
                }
                Some((value as i64 as u64) & crate::bits::max_value(bits))
            }
            _ => {
                let max = (1i128 << bits) - 1;
                if value < 0 || value > max {
                    return None;
                }
                Some(value as u64)
            }
        }
    }
}

impl fmt::Display for NumberFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endian = match self.endian {
            Endian::Big => "be",
            Endian::Little => "le",
        };
        write!(f, "{:?}/{}", self.repr, endian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unpack_big_endian() {
        assert_eq!(
            NumberFormat::U16.unpack(&[0x01, 0x02]),
            RawNumber::Unsigned(0x0102)
        );
        assert_eq!(
            NumberFormat::I16.unpack(&[0xff, 0xfe]),
            RawNumber::Signed(-2)
        );
    }

    #[test]
    fn test_unpack_little_endian() {
        let format = NumberFormat::le(Repr::U32);
        assert_eq!(
            format.unpack(&[0x04, 0x03, 0x02, 0x01]),
            RawNumber::Unsigned(0x01020304)
        );
    }

    #[test]
    fn test_unpack_float() {
        assert_eq!(
            NumberFormat::F32.unpack(&[0x40, 0x49, 0x0f, 0xdb]),
            RawNumber::Float(f32::from_bits(0x40490FDB) as f64)
        );
    }

    #[test]
    fn test_pack_bits() {
        assert_eq!(NumberFormat::U16.pack_bits(0x0102), vec![0x01, 0x02]);
        assert_eq!(
            NumberFormat::le(Repr::U16).pack_bits(0x0102),
            vec![0x02, 0x01]
        );
    }

    #[test]
    fn test_to_bits_range() {
        assert_eq!(NumberFormat::U8.to_bits(255.0), Some(255));
        assert_eq!(NumberFormat::U8.to_bits(256.0), None);
        assert_eq!(NumberFormat::U8.to_bits(-1.0), None);
        assert_eq!(NumberFormat::I8.to_bits(-1.0), Some(0xff));
        assert_eq!(NumberFormat::I8.to_bits(-129.0), None);
        assert_eq!(NumberFormat::U16.to_bits(f64::NAN), None);
    }

    #[test]
    fn test_to_bits_rounds() {
        assert_eq!(NumberFormat::U16.to_bits(12.6), Some(13));
    }

    #[test]
    fn test_to_bits_64_bit_bounds() {
        let i64_format = NumberFormat::be(Repr::I64);
        assert_eq!(i64_format.to_bits(9.223372036854775807e18), None);
        assert_eq!(i64_format.to_bits(-9.223372036854775808e18), Some(1 << 63));
        assert_eq!(i64_format.to_bits(-9.3e18), None);

        assert_eq!(NumberFormat::U64.to_bits(18446744073709551615.0), None);
        assert_eq!(NumberFormat::U64.to_bits(9.223372036854775808e18), Some(1 << 63));
        assert_eq!(NumberFormat::U32.to_bits(4294967295.0), Some(u32::MAX as u64));
        assert_eq!(NumberFormat::U32.to_bits(4294967296.0), None);
    }

    #[test]
    fn test_int_to_bits() {
        assert_eq!(NumberFormat::U64.int_to_bits(u64::MAX as i128), Some(u64::MAX));
        assert_eq!(NumberFormat::I16.int_to_bits(-2), Some(0xfffe));
        assert_eq!(NumberFormat::I16.int_to_bits(40000), None);
    }
}
