//! Numeric byte-range fields: plain numbers, fixed-point numbers and coded enumerations.
//!
//! A [NumberField] owns `format.width()` contiguous bytes. Its decoded value is
//! produced in three steps:
//! 1. Unpack with the declared [NumberFormat].
//! 2. If bit sub-fields are declared, keep only their bits and shift them down.
//! 3. Divide by `scale`, then apply the [Derivation], if any.

use std::fmt;
use std::sync::Arc;

use crate::{
    bits,
    codes::CodeTable,
    errors::{DecodeError, DefinitionError, EncodeError},
    field::{
        BitField, BitsField, Field, RegisterField, WriteMode, ensure_len, ensure_writable,
        require_current, type_mismatch,
    },
    format::{Endian, NumberFormat, RawNumber},
    value::{Resolved, Value},
};

/// Signature of a caller-provided dependency formula.
pub type Formula = dyn Fn(&Value, &Resolved) -> Result<Value, DecodeError> + Send + Sync;

#[derive(Clone)]
enum DerivationKind {
    Multiplier,
    Calibrated,
    Custom(Arc<Formula>),
}

/// A decode formula that needs the values of other fields.
#[derive(Clone)]
pub struct Derivation {
    deps: Vec<String>,
    kind: DerivationKind,
}

impl Derivation {
    /// Multiplies the decoded value by the numeric value of `dep`.
    pub fn multiplier(dep: impl Into<String>) -> Self {
        Derivation {
            deps: vec![dep.into()],
            kind: DerivationKind::Multiplier,
        }
    }

    /// Calibration-dependent formula.
    ///
    /// When `mode` decodes true (external calibration) the value is
    /// `(slope * raw + offset) / scale`; otherwise it is `raw / scale`.
    pub fn calibrated(
        mode: impl Into<String>,
        slope: impl Into<String>,
        offset: impl Into<String>,
    ) -> Self {
        Derivation {
            deps: vec![mode.into(), slope.into(), offset.into()],
            kind: DerivationKind::Calibrated,
        }
    }

    /// Arbitrary formula over the scaled value and the resolved context.
    ///
    /// Every name in `deps` is checked for presence before `formula` runs.
    pub fn custom<I, S, F>(deps: I, formula: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&Value, &Resolved) -> Result<Value, DecodeError> + Send + Sync + 'static,
    {
        Derivation {
            deps: deps.into_iter().map(Into::into).collect(),
            kind: DerivationKind::Custom(Arc::new(formula)),
        }
    }

    pub fn dependencies(&self) -> &[String] {
        &self.deps
    }

    fn apply(
        &self,
        field: &str,
        raw: RawNumber,
        scaled: Value,
        scale: Option<f64>,
        deps: &Resolved,
    ) -> Result<Value, DecodeError> {
        let require = |name: &String| dependency(field, deps, name);
        let non_numeric = |name: &String| DecodeError::NonNumericDependency {
            field: field.to_string(),
            dependency: name.clone(),
        };
        let numeric = |name: &String| -> Result<f64, DecodeError> {
            require(name)?.as_f64().ok_or_else(|| non_numeric(name))
        };

        match &self.kind {
            DerivationKind::Multiplier => {
                let multiplier = numeric(&self.deps[0])?;
                let base = scaled.as_f64().unwrap_or_default();
                Ok(Value::Float(base * multiplier))
            }
            // Slope and offset are only consulted for externally calibrated modules.
            DerivationKind::Calibrated => {
                let external = require(&self.deps[0])?
                    .as_bool()
                    .ok_or_else(|| non_numeric(&self.deps[0]))?;
                let scale = scale.unwrap_or(1.0);
                if external {
                    let slope = numeric(&self.deps[1])?;
                    let offset = numeric(&self.deps[2])?;
                    Ok(Value::Float((slope * raw.as_f64() + offset) / scale))
                } else {
                    Ok(Value::Float(raw.as_f64() / scale))
                }
            }
            DerivationKind::Custom(formula) => {
                for dep in &self.deps {
                    require(dep)?;
                }
                formula(&scaled, deps)
            }
        }
    }
}

/// Looks up `name` in the resolved context of `field`.
fn dependency<'a>(
    field: &str,
    deps: &'a Resolved,
    name: &str,
) -> Result<&'a Value, DecodeError> {
    deps.get(name).ok_or_else(|| DecodeError::MissingDependency {
        field: field.to_string(),
        dependency: name.to_string(),
    })
}

impl fmt::Debug for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DerivationKind::Multiplier => "Multiplier",
            DerivationKind::Calibrated => "Calibrated",
            DerivationKind::Custom(_) => "Custom",
        };
        f.debug_struct("Derivation")
            .field("kind", &kind)
            .field("deps", &self.deps)
            .finish()
    }
}

/// Position of a named bit sub-field within the unpacked integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BitRange {
    bitpos: u32,
    width: u32,
}

fn mark_read_only(sub: &mut Field) {
    match sub {
        Field::Bit(bit) => bit.read_only = true,
        Field::Bits(bits) => bits.read_only = true,
        _ => {}
    }
}

/// Integer or floating-point number spanning `format.width()` bytes.
#[derive(Debug, Clone)]
pub struct NumberField {
    pub name: String,
    pub offset: u64,
    pub format: NumberFormat,
    /// Divisor applied to the raw number on decode (multiplier on encode).
    pub scale: Option<f64>,
    pub read_only: bool,
    derivation: Option<Derivation>,
    ranges: Vec<BitRange>,
    sub_fields: Vec<Arc<Field>>,
}

impl NumberField {
    pub fn new(name: impl Into<String>, offset: u64, format: NumberFormat) -> Self {
        NumberField {
            name: name.into(),
            offset,
            format,
            scale: None,
            read_only: false,
            derivation: None,
            ranges: Vec::new(),
            sub_fields: Vec::new(),
        }
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Marks the field, and every bit sub-field, read-only.
    pub fn ro(mut self) -> Self {
        self.read_only = true;
        for sub in &mut self.sub_fields {
            mark_read_only(Arc::make_mut(sub));
        }
        self
    }

    pub fn derive(mut self, derivation: Derivation) -> Self {
        self.derivation = Some(derivation);
        self
    }

    /// Declares a named single-bit sub-field at integer bit position `bitpos`.
    pub fn bit(self, name: impl Into<String>, bitpos: u32) -> Self {
        self.bits(name, bitpos, 1)
    }

    /// Declares a named sub-field of `width` bits at integer bit position `bitpos`.
    ///
    /// The number then decodes only the union of its sub-field bits, shifted
    /// down by the lowest declared position. Each sub-field is also
    /// addressable on its own through the map.
    pub fn bits(mut self, name: impl Into<String>, bitpos: u32, width: u32) -> Self {
        let (offset, local) = self.byte_of(bitpos);
        let name = name.into();
        let mut sub: Field = if width == 1 {
            BitField::new(name, offset, local).into()
        } else {
            BitsField::new(name, offset, local, width.min(u8::MAX as u32) as u8).into()
        };
        if self.read_only {
            mark_read_only(&mut sub);
        }

        self.ranges.push(BitRange { bitpos, width });
        self.sub_fields.push(Arc::new(sub));
        self
    }

    /// Byte address and in-byte position of integer bit `bitpos`.
    fn byte_of(&self, bitpos: u32) -> (u64, u8) {
        let width = self.format.width() as u64;
        let byte = (bitpos / 8) as u64;
        let offset = match self.format.endian {
            Endian::Big => self.offset + width.saturating_sub(1).saturating_sub(byte),
            Endian::Little => self.offset + byte,
        };
        (offset, (bitpos % 8) as u8)
    }

    pub fn sub_fields(&self) -> &[Arc<Field>] {
        &self.sub_fields
    }

    pub fn derivation(&self) -> Option<&Derivation> {
        self.derivation.as_ref()
    }

    fn aggregate_mask(&self) -> Option<u64> {
        if self.ranges.is_empty() {
            return None;
        }

        Some(
            self.ranges
                .iter()
                .fold(0, |acc, r| acc | bits::mask(r.bitpos, r.width)),
        )
    }

    fn shift(&self) -> u32 {
        self.ranges.iter().map(|r| r.bitpos).min().unwrap_or(0)
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        if let Some(scale) = self.scale {
            if !scale.is_finite() || scale == 0.0 {
                return Err(DefinitionError::InvalidScale(self.name.clone()));
            }
        }

        let limit = (self.format.width() * 8) as u32;
        for (range, sub) in self.ranges.iter().zip(&self.sub_fields) {
            if range.width == 0 || range.bitpos + range.width > limit {
                return Err(DefinitionError::InvalidBitRange {
                    name: sub.name().to_string(),
                    bitpos: range.bitpos.min(u8::MAX as u32) as u8,
                    width: range.width.min(u8::MAX as u32) as u8,
                    limit,
                });
            }
            if self.format.repr.is_float() {
                return Err(DefinitionError::UnsupportedFormat {
                    name: self.name.clone(),
                    format: self.format.to_string(),
                });
            }
            sub.validate()?;
        }

        Ok(())
    }

    /// Unpacks and masks the number without scaling.
    pub(crate) fn decode_raw(&self, raw: &[u8]) -> Result<RawNumber, DecodeError> {
        let width = self.format.width();
        ensure_len(&self.name, raw, width)?;

        let bits = self.format.unpack_bits(&raw[..width]);
        Ok(match self.aggregate_mask() {
            Some(mask) => RawNumber::Unsigned((bits & mask) >> self.shift()),
            None => self.format.interpret(bits),
        })
    }

    /// Raw bit pattern for an already unscaled number.
    fn to_bits(&self, value: &Value, unscaled: f64) -> Result<u64, EncodeError> {
        let bits = match value {
            Value::UInt(v) if self.scale.is_none() => self.format.int_to_bits(*v as i128),
            Value::Int(v) if self.scale.is_none() => self.format.int_to_bits(*v as i128),
            _ => self.format.to_bits(unscaled),
        };
        bits.ok_or_else(|| EncodeError::OutOfRange(self.name.clone()))
    }

    /// Encodes an already scaled value.
    pub(crate) fn encode_scaled(
        &self,
        value: &Value,
        current: Option<&[u8]>,
    ) -> Result<Vec<u8>, EncodeError> {
        let number = value
            .as_f64()
            .ok_or_else(|| type_mismatch(&self.name, value))?;
        let unscaled = number * self.scale.unwrap_or(1.0);
        let bits = self.to_bits(value, unscaled)?;

        let Some(mask) = self.aggregate_mask() else {
            return Ok(self.format.pack_bits(bits));
        };

        let shift = self.shift();
        if bits > (mask >> shift) {
            return Err(EncodeError::OutOfRange(self.name.clone()));
        }
        let shifted = bits << shift;
        if shifted & !mask != 0 {
            return Err(EncodeError::OutOfRange(self.name.clone()));
        }

        let base = match self.write_mode() {
            WriteMode::Direct => 0,
            WriteMode::ReadModifyWrite => {
                let width = self.format.width();
                let current = require_current(&self.name, current, width)?;
                self.format.unpack_bits(current)
            }
        };

        Ok(self
            .format
            .pack_bits(bits::merge_masked(base, mask, shifted)))
    }
}

impl RegisterField for NumberField {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> usize {
        self.format.width()
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn bitmask(&self) -> Option<u64> {
        self.aggregate_mask()
    }

    fn dependencies(&self) -> &[String] {
        self.derivation
            .as_ref()
            .map(Derivation::dependencies)
            .unwrap_or(&[])
    }

    fn write_mode(&self) -> WriteMode {
        let full = bits::max_value((self.format.width() * 8) as u32);
        match self.aggregate_mask() {
            Some(mask) if mask != full => WriteMode::ReadModifyWrite,
            _ => WriteMode::Direct,
        }
    }

    fn decode(&self, raw: &[u8], deps: &Resolved) -> Result<Value, DecodeError> {
        let number = self.decode_raw(raw)?;
        let scaled = match (number, self.scale) {
            (n, Some(scale)) => Value::Float(n.as_f64() / scale),
            (RawNumber::Unsigned(v), None) => Value::UInt(v),
            (RawNumber::Signed(v), None) => Value::Int(v),
            (RawNumber::Float(v), None) => Value::Float(v),
        };

        match &self.derivation {
            Some(derivation) => derivation.apply(&self.name, number, scaled, self.scale, deps),
            None => Ok(scaled),
        }
    }

    fn encode(&self, value: &Value, current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(&self.name, self.read_only)?;
        if self.derivation.is_some() {
            return Err(EncodeError::Derived(self.name.clone()));
        }

        self.encode_scaled(value, current)
    }
}

/// Binary fixed-point number: a [NumberField] further divided by `2^num_frac_bits`.
#[derive(Debug, Clone)]
pub struct FixedPointField {
    inner: NumberField,
    pub num_frac_bits: u32,
}

impl FixedPointField {
    pub fn new(
        name: impl Into<String>,
        offset: u64,
        format: NumberFormat,
        num_frac_bits: u32,
    ) -> Self {
        FixedPointField {
            inner: NumberField::new(name, offset, format),
            num_frac_bits,
        }
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.inner = self.inner.scale(scale);
        self
    }

    pub fn ro(mut self) -> Self {
        self.inner = self.inner.ro();
        self
    }

    pub fn inner(&self) -> &NumberField {
        &self.inner
    }

    fn divisor(&self) -> f64 {
        2f64.powi(self.num_frac_bits as i32)
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        let limit = (self.inner.format.width() * 8) as u32;
        if self.num_frac_bits > limit || self.inner.format.repr.is_float() {
            return Err(DefinitionError::UnsupportedFormat {
                name: self.inner.name.clone(),
                format: self.inner.format.to_string(),
            });
        }

        self.inner.validate()
    }
}

impl RegisterField for FixedPointField {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn offset(&self) -> u64 {
        self.inner.offset()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn read_only(&self) -> bool {
        self.inner.read_only()
    }

    fn bitmask(&self) -> Option<u64> {
        self.inner.bitmask()
    }

    fn write_mode(&self) -> WriteMode {
        self.inner.write_mode()
    }

    fn decode(&self, raw: &[u8], deps: &Resolved) -> Result<Value, DecodeError> {
        let value = self.inner.decode(raw, deps)?;
        let number = value.as_f64().unwrap_or_default();
        Ok(Value::Float(number / self.divisor()))
    }

    fn encode(&self, value: &Value, current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(self.name(), self.read_only())?;
        let number = value
            .as_f64()
            .ok_or_else(|| type_mismatch(self.name(), value))?;

        self.inner
            .encode_scaled(&Value::Float(number * self.divisor()), current)
    }
}

/// Enumerated number looked up in a [CodeTable].
///
/// Codes missing from the table decode to [Value::Unknown] instead of failing:
/// modules routinely report codes newer than the table.
#[derive(Debug, Clone)]
pub struct CodeField {
    inner: NumberField,
    table: Arc<CodeTable>,
}

impl CodeField {
    pub fn new(
        name: impl Into<String>,
        offset: u64,
        format: NumberFormat,
        table: Arc<CodeTable>,
    ) -> Self {
        CodeField {
            inner: NumberField::new(name, offset, format),
            table,
        }
    }

    /// Single-byte code, the common case.
    pub fn byte(name: impl Into<String>, offset: u64, table: Arc<CodeTable>) -> Self {
        Self::new(name, offset, NumberFormat::U8, table)
    }

    pub fn ro(mut self) -> Self {
        self.inner = self.inner.ro();
        self
    }

    /// Declares a named bit sub-field; see [NumberField::bits].
    pub fn bits(mut self, name: impl Into<String>, bitpos: u32, width: u32) -> Self {
        self.inner = self.inner.bits(name, bitpos, width);
        self
    }

    pub fn inner(&self) -> &NumberField {
        &self.inner
    }

    pub fn table(&self) -> &CodeTable {
        &self.table
    }

    /// Codes are unsigned; signed and float formats are rejected.
    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        if self.inner.format.repr.is_signed() {
            return Err(DefinitionError::UnsupportedFormat {
                name: self.inner.name.clone(),
                format: self.inner.format.to_string(),
            });
        }

        self.inner.validate()
    }
}

impl RegisterField for CodeField {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn offset(&self) -> u64 {
        self.inner.offset()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn read_only(&self) -> bool {
        self.inner.read_only()
    }

    fn bitmask(&self) -> Option<u64> {
        self.inner.bitmask()
    }

    fn write_mode(&self) -> WriteMode {
        self.inner.write_mode()
    }

    fn decode(&self, raw: &[u8], _deps: &Resolved) -> Result<Value, DecodeError> {
        let code = match self.inner.decode_raw(raw)? {
            RawNumber::Unsigned(v) => v,
            RawNumber::Signed(v) => v as u64,
            RawNumber::Float(v) => v as u64,
        };

        Ok(match self.table.label(code) {
            Some(label) => Value::Str(label.to_string()),
            None => Value::Unknown(code),
        })
    }

    fn encode(&self, value: &Value, current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(self.name(), self.read_only())?;
        let code = match value {
            Value::Str(label) => {
                self.table
                    .code(label)
                    .ok_or_else(|| EncodeError::InvalidValue {
                        field: self.name().to_string(),
                        reason: format!("no code for label `{label}`"),
                    })?
            }
            Value::Unknown(code) => *code,
            other => other
                .as_u64()
                .ok_or_else(|| type_mismatch(self.name(), other))?,
        };

        self.inner.encode_scaled(&Value::UInt(code), current)
    }
}
