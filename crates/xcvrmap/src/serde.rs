//! JSON-deserializable map definitions.
//!
//! These types describe a register map as data, e.g. a map file shipped next
//! to a platform driver, and are compiled into a [RegisterMap] with
//! [MapDef::compile]. Paged addresses are flattened during compilation.
//!
//! Decoded [Value]s serialize to plain JSON: groups become objects and
//! unknown codes become the string `"Unknown"`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};

use crate::{
    codes::{CodeTable, Codes},
    errors::DefinitionError,
    field::{BitField, BitsField, Field},
    format::{Endian, NumberFormat, Repr},
    group::GroupField,
    map::{RegisterMap, page_addr},
    number::{CodeField, Derivation, FixedPointField, NumberField},
    text::{DateField, HexField, StringField},
    value::Value,
};

/// Top-level map definition.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MapDef {
    /// ABI revision label, e.g. `"CMIS 5.0"`.
    pub revision: String,
    /// Code tables by name, each mapping a raw code to its label.
    #[serde(default)]
    pub codes: HashMap<String, HashMap<u64, String>>,
    pub fields: Vec<FieldDef>,
}

impl MapDef {
    /// Builds the code tables and fields, then the map.
    pub fn compile(self) -> Result<RegisterMap, DefinitionError> {
        let codes = self
            .codes
            .into_iter()
            .fold(Codes::new(), |codes, (name, table)| {
                codes.with_table(name, CodeTable::new(table))
            });

        let fields = self
            .fields
            .into_iter()
            .map(|def| def.build(&codes))
            .collect::<Result<Vec<_>, _>>()?;

        RegisterMap::new(self.revision, codes, fields)
    }
}

/// Number representation.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
pub enum ReprDef {
    #[default]
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

impl From<ReprDef> for Repr {
    fn from(value: ReprDef) -> Self {
        match value {
            ReprDef::U8 => Repr::U8,
            ReprDef::I8 => Repr::I8,
            ReprDef::U16 => Repr::U16,
            ReprDef::I16 => Repr::I16,
            ReprDef::U32 => Repr::U32,
            ReprDef::I32 => Repr::I32,
            ReprDef::U64 => Repr::U64,
            ReprDef::I64 => Repr::I64,
            ReprDef::F32 => Repr::F32,
            ReprDef::F64 => Repr::F64,
        }
    }
}

/// Byte order; defaults to big-endian.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default)]
pub enum EndianDef {
    #[default]
    Big,
    Little,
}

fn format(repr: ReprDef, endian: EndianDef) -> NumberFormat {
    NumberFormat {
        repr: repr.into(),
        endian: match endian {
            EndianDef::Big => Endian::Big,
            EndianDef::Little => Endian::Little,
        },
    }
}

/// Named bit sub-field of a number or code field.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SubBitsDef {
    pub name: String,
    /// Bit position within the unpacked integer.
    pub bitpos: u32,
    #[serde(default = "one")]
    pub width: u32,
}

fn one() -> u32 {
    1
}

/// Dependency formula of a number field.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "kind")]
pub enum DerivationDef {
    Multiplier {
        dep: String,
    },
    Calibrated {
        mode: String,
        slope: String,
        offset: String,
    },
}

impl From<DerivationDef> for Derivation {
    fn from(value: DerivationDef) -> Self {
        match value {
            DerivationDef::Multiplier { dep } => Derivation::multiplier(dep),
            DerivationDef::Calibrated {
                mode,
                slope,
                offset,
            } => Derivation::calibrated(mode, slope, offset),
        }
    }
}

/// Location shared by every addressed field: an offset, optionally within a page.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct AddrDef {
    #[serde(default)]
    pub page: Option<u64>,
    pub offset: u64,
}

impl AddrDef {
    fn flat(self) -> u64 {
        match self.page {
            Some(page) => page_addr(page, self.offset),
            None => self.offset,
        }
    }
}

/// One field declaration.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "type")]
pub enum FieldDef {
    Bit {
        name: String,
        #[serde(flatten)]
        addr: AddrDef,
        bitpos: u8,
        #[serde(default)]
        ro: bool,
    },
    Bits {
        name: String,
        #[serde(flatten)]
        addr: AddrDef,
        bitpos: u8,
        width: u8,
        #[serde(default)]
        ro: bool,
    },
    Number {
        name: String,
        #[serde(flatten)]
        addr: AddrDef,
        #[serde(default)]
        format: ReprDef,
        #[serde(default)]
        endian: EndianDef,
        #[serde(default)]
        scale: Option<f64>,
        #[serde(default)]
        ro: bool,
        #[serde(default)]
        bits: Vec<SubBitsDef>,
        #[serde(default)]
        derive: Option<DerivationDef>,
    },
    FixedPoint {
        name: String,
        #[serde(flatten)]
        addr: AddrDef,
        #[serde(default)]
        format: ReprDef,
        #[serde(default)]
        endian: EndianDef,
        num_frac_bits: u32,
        #[serde(default)]
        scale: Option<f64>,
        #[serde(default)]
        ro: bool,
    },
    String {
        name: String,
        #[serde(flatten)]
        addr: AddrDef,
        size: usize,
        #[serde(default)]
        ro: bool,
        #[serde(default)]
        zero_terminated: bool,
        #[serde(default)]
        trim: bool,
    },
    Date {
        name: String,
        #[serde(flatten)]
        addr: AddrDef,
        size: usize,
        #[serde(default)]
        ro: bool,
    },
    Code {
        name: String,
        #[serde(flatten)]
        addr: AddrDef,
        #[serde(default)]
        format: ReprDef,
        #[serde(default)]
        endian: EndianDef,
        /// Name of a table in [MapDef::codes].
        table: String,
        #[serde(default)]
        ro: bool,
        #[serde(default)]
        bits: Vec<SubBitsDef>,
    },
    Hex {
        name: String,
        #[serde(flatten)]
        addr: AddrDef,
        size: usize,
        #[serde(default)]
        ro: bool,
    },
    Group {
        name: String,
        fields: Vec<FieldDef>,
        #[serde(default)]
        ro: bool,
    },
}

impl FieldDef {
    /// Builds the field, resolving code tables against `codes`.
    pub fn build(self, codes: &Codes) -> Result<Field, DefinitionError> {
        let field: Field = match self {
            FieldDef::Bit {
                name,
                addr,
                bitpos,
                ro,
            } => {
                let field = BitField::new(name, addr.flat(), bitpos);
                Field::from(if ro { field.ro() } else { field })
            }
            FieldDef::Bits {
                name,
                addr,
                bitpos,
                width,
                ro,
            } => {
                let field = BitsField::new(name, addr.flat(), bitpos, width);
                Field::from(if ro { field.ro() } else { field })
            }
            FieldDef::Number {
                name,
                addr,
                format: repr,
                endian,
                scale,
                ro,
                bits,
                derive,
            } => {
                let mut field = NumberField::new(name, addr.flat(), format(repr, endian));
                if let Some(scale) = scale {
                    field = field.scale(scale);
                }
                for sub in bits {
                    field = field.bits(sub.name, sub.bitpos, sub.width);
                }
                if let Some(derive) = derive {
                    field = field.derive(derive.into());
                }
                Field::from(if ro { field.ro() } else { field })
            }
            FieldDef::FixedPoint {
                name,
                addr,
                format: repr,
                endian,
                num_frac_bits,
                scale,
                ro,
            } => {
                let mut field =
                    FixedPointField::new(name, addr.flat(), format(repr, endian), num_frac_bits);
                if let Some(scale) = scale {
                    field = field.scale(scale);
                }
                Field::from(if ro { field.ro() } else { field })
            }
            FieldDef::String {
                name,
                addr,
                size,
                ro,
                zero_terminated,
                trim,
            } => {
                let mut field = StringField::new(name, addr.flat(), size);
                field.read_only = ro;
                field.zero_terminated = zero_terminated;
                field.trim = trim;
                Field::from(field)
            }
            FieldDef::Date {
                name,
                addr,
                size,
                ro,
            } => {
                let field = DateField::new(name, addr.flat(), size);
                Field::from(if ro { field.ro() } else { field })
            }
            FieldDef::Code {
                name,
                addr,
                format: repr,
                endian,
                table,
                ro,
                bits,
            } => {
                let table = codes.table(&table)?;
                let mut field = CodeField::new(name, addr.flat(), format(repr, endian), table);
                for sub in bits {
                    field = field.bits(sub.name, sub.bitpos, sub.width);
                }
                Field::from(if ro { field.ro() } else { field })
            }
            FieldDef::Hex {
                name,
                addr,
                size,
                ro,
            } => {
                let field = HexField::new(name, addr.flat(), size);
                Field::from(if ro { field.ro() } else { field })
            }
            FieldDef::Group { name, fields, ro } => {
                let children = fields
                    .into_iter()
                    .map(|def| def.build(codes))
                    .collect::<Result<Vec<_>, _>>()?;
                let group = GroupField::new(name, children);
                Field::from(if ro { group.ro() } else { group })
            }
        };

        Ok(field)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Unknown(_) => serializer.serialize_str("Unknown"),
            Value::Group(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (name, value) in members {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::RegisterField;
    use crate::value::Resolved;

    const DEFINITION: &str = r#"{
        "revision": "SFF-8472 rev 12.4",
        "codes": {
            "CONNECTOR": { "7": "LC", "12": "MPO 1x12" }
        },
        "fields": [
            { "type": "Code", "name": "Connector", "offset": 2, "table": "CONNECTOR", "ro": true },
            {
                "type": "Group",
                "name": "Dom",
                "fields": [
                    {
                        "type": "Number", "name": "Temperature", "page": 1, "offset": 96,
                        "format": "I16", "scale": 256.0, "ro": true,
                        "derive": { "kind": "Calibrated", "mode": "ExternalCalibration",
                                    "slope": "TempSlope", "offset": "TempOffset" }
                    },
                    { "type": "Number", "name": "Flags", "page": 1, "offset": 110,
                      "bits": [ { "name": "TxDisableState", "bitpos": 7 } ] }
                ]
            },
            { "type": "String", "name": "VendorName", "offset": 20, "size": 16, "trim": true }
        ]
    }"#;

    #[test]
    fn test_compile_definition() {
        let def: MapDef = serde_json::from_str(DEFINITION).unwrap();
        let map = def.compile().unwrap();

        assert_eq!(map.revision(), "SFF-8472 rev 12.4");
        assert!(map.get_field("Connector").unwrap().read_only());
        assert_eq!(map.get_field("Temperature").unwrap().offset(), 128 + 96);
        assert_eq!(map.get_field("TxDisableState").unwrap().offset(), 128 + 110);
        assert_eq!(map.get_field("Dom").unwrap().offset(), 128 + 96);
        assert_eq!(map.get_field("Dom").unwrap().size(), 15);
        assert_eq!(
            map.get_field("Connector")
                .unwrap()
                .decode(&[7], &Resolved::new())
                .unwrap(),
            Value::Str("LC".to_string())
        );
    }

    #[test]
    fn test_unknown_table_is_definition_error() {
        let def: MapDef = serde_json::from_str(
            r#"{ "revision": "x", "fields": [
                { "type": "Code", "name": "C", "offset": 0, "table": "MISSING" }
            ] }"#,
        )
        .unwrap();
        assert_eq!(
            def.compile().unwrap_err(),
            DefinitionError::UnknownCodeTable("MISSING".to_string())
        );
    }

    #[test]
    fn test_value_to_json() {
        let value = Value::Group(
            [
                ("Connector".to_string(), Value::Unknown(0x42)),
                ("Temperature".to_string(), Value::Float(25.5)),
                ("Present".to_string(), Value::Bool(true)),
            ]
            .into_iter()
            .collect(),
        );
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            serde_json::json!({
                "Connector": "Unknown",
                "Temperature": 25.5,
                "Present": true
            })
        );
    }
}
