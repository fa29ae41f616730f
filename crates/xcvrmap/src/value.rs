//! Decoded field values.

use std::collections::BTreeMap;
use std::fmt;

/// Already-decoded values keyed by field name, used as dependency context.
pub type Resolved = BTreeMap<String, Value>;

/// A value produced by decoding a field, or accepted when encoding one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(String),
    /// A code that is absent from the field's code table. Displays as `Unknown`.
    Unknown(u64),
    /// Members of a group field, keyed by child name.
    Group(BTreeMap<String, Value>),
}

impl Value {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::UInt(_) => "unsigned",
            Value::Int(_) => "signed",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Unknown(_) => "unknown code",
            Value::Group(_) => "group",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::UInt(v) => Some(*v != 0),
            Value::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Bool(b) => Some(*b as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Numeric view of the value. Booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::UInt(v) => Some(*v as f64),
            Value::Int(v) => Some(*v as f64),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Group(members) => Some(members),
            _ => None,
        }
    }

    /// Looks up a member of a group value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_group().and_then(|members| members.get(name))
    }

    /// True for the unknown-code sentinel.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Unknown(_) => write!(f, "Unknown"),
            Value::Group(members) => {
                write!(f, "{{")?;
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::UInt(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::UInt(3).as_f64(), Some(3.0));
        assert_eq!(Value::Int(-3).as_u64(), None);
        assert_eq!(Value::Bool(true).as_u64(), Some(1));
        assert_eq!(Value::Str("x".into()).as_f64(), None);
    }

    #[test]
    fn test_unknown_displays_sentinel() {
        assert_eq!(Value::Unknown(0x42).to_string(), "Unknown");
        assert!(Value::Unknown(0x42).is_unknown());
    }

    #[test]
    fn test_group_display_and_get() {
        let group = Value::Group(BTreeMap::from([
            ("a".to_string(), Value::UInt(1)),
            ("b".to_string(), Value::Bool(false)),
        ]));
        assert_eq!(group.to_string(), "{a: 1, b: false}");
        assert_eq!(group.get("a"), Some(&Value::UInt(1)));
        assert_eq!(group.get("c"), None);
    }
}
