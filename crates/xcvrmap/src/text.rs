//! Text-like byte-range fields: ASCII strings, date codes and hex dumps.

use crate::{
    errors::{DecodeError, DefinitionError, EncodeError},
    field::{RegisterField, WriteMode, ensure_len, ensure_writable, type_mismatch},
    value::{Resolved, Value},
};

/// Fixed-length ASCII string.
///
/// Device strings are space padded and sometimes garbage terminated, so bytes
/// outside the ASCII range are dropped instead of failing the decode.
#[derive(Debug, Clone, PartialEq)]
pub struct StringField {
    pub name: String,
    pub offset: u64,
    pub size: usize,
    pub read_only: bool,
    /// Truncate at the first NUL byte before decoding.
    pub zero_terminated: bool,
    /// Trim leading and trailing whitespace from the decoded string.
    pub trim: bool,
}

impl StringField {
    pub fn new(name: impl Into<String>, offset: u64, size: usize) -> Self {
        StringField {
            name: name.into(),
            offset,
            size,
            read_only: false,
            zero_terminated: false,
            trim: false,
        }
    }

    pub fn ro(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn zero_terminated(mut self) -> Self {
        self.zero_terminated = true;
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        if self.size == 0 {
            return Err(DefinitionError::InvalidFieldSize {
                name: self.name.clone(),
                size: self.size,
            });
        }

        Ok(())
    }

    fn decode_text(&self, raw: &[u8]) -> Result<String, DecodeError> {
        ensure_len(&self.name, raw, self.size)?;

        let mut bytes = &raw[..self.size];
        if self.zero_terminated {
            if let Some(pos) = bytes.iter().position(|b| *b == 0) {
                bytes = &bytes[..pos];
            }
        }

        let text: String = bytes
            .iter()
            .filter(|b| b.is_ascii())
            .map(|b| *b as char)
            .collect();

        Ok(if self.trim {
            text.trim().to_string()
        } else {
            text
        })
    }

    fn encode_text(&self, text: &str) -> Result<Vec<u8>, EncodeError> {
        if !text.is_ascii() {
            return Err(EncodeError::InvalidValue {
                field: self.name.clone(),
                reason: "string is not ASCII".to_string(),
            });
        }
        if text.len() > self.size {
            return Err(EncodeError::OutOfRange(self.name.clone()));
        }

        let mut out = text.as_bytes().to_vec();
        out.resize(self.size, b' ');
        Ok(out)
    }
}

impl RegisterField for StringField {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Direct
    }

    fn decode(&self, raw: &[u8], _deps: &Resolved) -> Result<Value, DecodeError> {
        self.decode_text(raw).map(Value::Str)
    }

    fn encode(&self, value: &Value, _current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(&self.name, self.read_only)?;
        let text = value
            .as_str()
            .ok_or_else(|| type_mismatch(&self.name, value))?;

        self.encode_text(text)
    }
}

/// Date code stored as `YYMMDD` followed by an optional lot code.
///
/// Decodes to `20YY-MM-DD`, with `:lot` appended when the lot code is not blank.
#[derive(Debug, Clone, PartialEq)]
pub struct DateField {
    inner: StringField,
}

impl DateField {
    /// `size` covers the six date characters plus the lot code (8 in CMIS and SFF-8472).
    pub fn new(name: impl Into<String>, offset: u64, size: usize) -> Self {
        DateField {
            inner: StringField::new(name, offset, size),
        }
    }

    pub fn ro(mut self) -> Self {
        self.inner = self.inner.ro();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        if self.inner.size < 6 {
            return Err(DefinitionError::InvalidFieldSize {
                name: self.inner.name.clone(),
                size: self.inner.size,
            });
        }

        Ok(())
    }

    fn invalid(&self, reason: &str) -> EncodeError {
        EncodeError::InvalidValue {
            field: self.inner.name.clone(),
            reason: reason.to_string(),
        }
    }
}

impl RegisterField for DateField {
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

    fn write_mode(&self) -> WriteMode {
        WriteMode::Direct
    }

    fn decode(&self, raw: &[u8], _deps: &Resolved) -> Result<Value, DecodeError> {
        let text = self.inner.decode_text(raw)?;
        let part = |from: usize, to: usize| text.get(from..to.min(text.len())).unwrap_or("");

        let mut date = format!("20{}-{}-{}", part(0, 2), part(2, 4), part(4, 6));
        let lot = part(6, text.len()).trim();
        if !lot.is_empty() {
            date.push(':');
            date.push_str(lot);
        }

        Ok(Value::Str(date))
    }

    fn encode(&self, value: &Value, _current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(self.name(), self.read_only())?;
        let text = value
            .as_str()
            .ok_or_else(|| type_mismatch(self.name(), value))?;

        let (date, lot) = match text.split_once(':') {
            Some((date, lot)) => (date, lot),
            None => (text, ""),
        };

        let parts: Vec<&str> = date.split('-').collect();
        let [year, month, day] = parts.as_slice() else {
            return Err(self.invalid("expected 20YY-MM-DD"));
        };
        let year = year
            .strip_prefix("20")
            .ok_or_else(|| self.invalid("year must be 20YY"))?;
        for part in [year, *month, *day] {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(self.invalid("date parts must be two digits"));
            }
        }

        self.inner
            .encode_text(&format!("{year}{month}{day}{lot}"))
    }
}

/// Raw bytes rendered as hyphen-joined lowercase hex pairs, e.g. `0a-1b-ff`.
#[derive(Debug, Clone, PartialEq)]
pub struct HexField {
    pub name: String,
    pub offset: u64,
    pub size: usize,
    pub read_only: bool,
}

impl HexField {
    pub fn new(name: impl Into<String>, offset: u64, size: usize) -> Self {
        HexField {
            name: name.into(),
            offset,
            size,
            read_only: false,
        }
    }

    pub fn ro(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        if self.size == 0 {
            return Err(DefinitionError::InvalidFieldSize {
                name: self.name.clone(),
                size: self.size,
            });
        }

        Ok(())
    }
}

impl RegisterField for HexField {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn write_mode(&self) -> WriteMode {
        WriteMode::Direct
    }

    fn decode(&self, raw: &[u8], _deps: &Resolved) -> Result<Value, DecodeError> {
        ensure_len(&self.name, raw, self.size)?;

        let pairs: Vec<String> = raw[..self.size]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Ok(Value::Str(pairs.join("-")))
    }

    fn encode(&self, value: &Value, _current: Option<&[u8]>) -> Result<Vec<u8>, EncodeError> {
        ensure_writable(&self.name, self.read_only)?;
        let text = value
            .as_str()
            .ok_or_else(|| type_mismatch(&self.name, value))?;

        let bytes = text
            .split('-')
            .map(|pair| u8::from_str_radix(pair, 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|e| EncodeError::InvalidValue {
                field: self.name.clone(),
                reason: e.to_string(),
            })?;
        if bytes.len() != self.size {
            return Err(EncodeError::OutOfRange(self.name.clone()));
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_deps() -> Resolved {
        Resolved::new()
    }

    #[test]
    fn test_string_decode_drops_non_ascii() {
        let field = StringField::new("VendorName", 129, 7);
        assert_eq!(
            field.decode(b"AC\xffME  ", &no_deps()).unwrap(),
            Value::Str("ACME  ".to_string())
        );
    }

    #[test]
    fn test_string_options() {
        let field = StringField::new("VendorPN", 148, 8).zero_terminated().trim();
        assert_eq!(
            field.decode(b" QSFP\0xx", &no_deps()).unwrap(),
            Value::Str("QSFP".to_string())
        );
    }

    #[test]
    fn test_string_encode_pads() {
        let field = StringField::new("VendorName", 129, 6);
        assert_eq!(
            field.encode(&Value::Str("ACME".into()), None).unwrap(),
            b"ACME  ".to_vec()
        );
        assert_eq!(
            field.encode(&Value::Str("TOO LONG".into()), None).unwrap_err(),
            EncodeError::OutOfRange("VendorName".to_string())
        );
        assert!(matches!(
            field.encode(&Value::Str("é".into()), None).unwrap_err(),
            EncodeError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_string_short_read() {
        let field = StringField::new("VendorName", 129, 16);
        assert!(matches!(
            field.decode(b"short", &no_deps()).unwrap_err(),
            DecodeError::ShortRead { expected: 16, actual: 5, .. }
        ));
    }

    #[test]
    fn test_date_decode() {
        let field = DateField::new("DateCode", 182, 8);
        assert_eq!(
            field.decode(b"21033101", &no_deps()).unwrap(),
            Value::Str("2021-03-31:01".to_string())
        );
        assert_eq!(
            field.decode(b"210331  ", &no_deps()).unwrap(),
            Value::Str("2021-03-31".to_string())
        );
    }

    #[test]
    fn test_date_encode() {
        let field = DateField::new("DateCode", 182, 8);
        assert_eq!(
            field.encode(&Value::Str("2021-03-31:01".into()), None).unwrap(),
            b"21033101".to_vec()
        );
        assert_eq!(
            field.encode(&Value::Str("2021-03-31".into()), None).unwrap(),
            b"210331  ".to_vec()
        );
        assert!(field.encode(&Value::Str("1999-03-31".into()), None).is_err());
        assert!(field.encode(&Value::Str("2021-3-31".into()), None).is_err());
    }

    #[test]
    fn test_hex_decode_and_encode() {
        let field = HexField::new("VendorSpecific", 224, 3);
        assert_eq!(
            field.decode(&[0x0a, 0x1b, 0xff], &no_deps()).unwrap(),
            Value::Str("0a-1b-ff".to_string())
        );
        assert_eq!(
            field.encode(&Value::Str("0a-1b-ff".into()), None).unwrap(),
            vec![0x0a, 0x1b, 0xff]
        );
        assert_eq!(
            field.encode(&Value::Str("0a-1b".into()), None).unwrap_err(),
            EncodeError::OutOfRange("VendorSpecific".to_string())
        );
        assert!(matches!(
            field.encode(&Value::Str("zz-1b-ff".into()), None).unwrap_err(),
            EncodeError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_text_read_only() {
        let field = HexField::new("Id", 0, 1).ro();
        assert_eq!(
            field.encode(&Value::Str("00".into()), None).unwrap_err(),
            EncodeError::ReadOnly("Id".to_string())
        );
    }
}
