use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::AttributeType;

/// A typed attribute value as seen by table operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Absent value; the row entry holds a null address
    Null,

    /// String value, at most 64 bytes of UTF-8
    String(String),

    /// 64-bit signed integer
    Integer(i64),

    /// Boolean value
    Boolean(bool),
}

impl Value {
    /// Returns the attribute type this value can be stored in.
    pub fn attribute_type(&self) -> Option<AttributeType> {
        match self {
            Value::Null => None,
            Value::String(_) => Some(AttributeType::String),
            Value::Integer(_) => Some(AttributeType::Integer),
            Value::Boolean(_) => Some(AttributeType::Boolean),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null fits every attribute type.
    pub fn fits(&self, attribute_type: AttributeType) -> bool {
        self.attribute_type()
            .map_or(true, |own| own == attribute_type)
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Attribute values of one object, keyed by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(name.into(), value.into())
    }

    /// Value of `name`; a missing attribute reads as null.
    pub fn get(&self, name: &str) -> &Value {
        self.values.get(name).unwrap_or(&Value::Null)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert_eq!(Value::from("Ada").attribute_type(), Some(AttributeType::String));
        assert_eq!(Value::from(36).attribute_type(), Some(AttributeType::Integer));
        assert_eq!(Value::from(true).attribute_type(), Some(AttributeType::Boolean));
        assert_eq!(Value::Null.attribute_type(), None);

        assert!(Value::Null.fits(AttributeType::Boolean));
        assert!(!Value::from(1).fits(AttributeType::String));
    }

    #[test]
    fn test_row_builder_and_display() {
        let row = Row::new().with("name", "Ada").with("age", 36);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("name"), &Value::from("Ada"));
        assert_eq!(row.get("email"), &Value::Null);
        assert_eq!(row.to_string(), "{age: 36, name: 'Ada'}");

        let collected: Row = vec![("age", Value::from(36)), ("name", Value::from("Ada"))]
            .into_iter()
            .collect();
        assert_eq!(collected, row);
    }
}
