use std::fmt;
use std::str::FromStr;

use crate::common::{DbError, PageType, Result, ADDRESS_SIZE, STRING_SIZE};

/// Type of a table attribute. An attribute's type is never stored in the
/// catalog: it is the page type of the attribute's root page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// Space-padded UTF-8, at most 64 bytes
    String,
    /// 64-bit signed integer, big-endian
    Integer,
    /// 1 byte (0 = false, 1 = true)
    Boolean,
}

impl AttributeType {
    /// Page type of the attribute's value pages.
    pub fn page_type(&self) -> PageType {
        match self {
            AttributeType::String => PageType::String,
            AttributeType::Integer => PageType::Integer,
            AttributeType::Boolean => PageType::Boolean,
        }
    }

    pub fn from_page_type(page_type: PageType) -> Result<Self> {
        match page_type {
            PageType::String => Ok(AttributeType::String),
            PageType::Integer => Ok(AttributeType::Integer),
            PageType::Boolean => Ok(AttributeType::Boolean),
            other => Err(DbError::UnknownAttributeType(other.to_string())),
        }
    }

    /// Size of the stored value, without the back-link.
    pub fn value_size(&self) -> usize {
        match self {
            AttributeType::String => STRING_SIZE,
            AttributeType::Integer => 8,
            AttributeType::Boolean => 1,
        }
    }

    /// Size of one record on the attribute's pages: back-link + value.
    pub fn record_size(&self) -> usize {
        ADDRESS_SIZE + self.value_size()
    }
}

impl FromStr for AttributeType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "str" | "text" => Ok(AttributeType::String),
            "integer" | "int" | "long" => Ok(AttributeType::Integer),
            "boolean" | "bool" => Ok(AttributeType::Boolean),
            _ => Err(DbError::UnknownAttributeType(s.to_string())),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::String => write!(f, "STRING"),
            AttributeType::Integer => write!(f, "INTEGER"),
            AttributeType::Boolean => write!(f, "BOOLEAN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(AttributeType::String.record_size(), 70);
        assert_eq!(AttributeType::Integer.record_size(), 14);
        assert_eq!(AttributeType::Boolean.record_size(), 7);
    }

    #[test]
    fn test_parse_and_page_type() {
        assert_eq!("INT".parse::<AttributeType>().unwrap(), AttributeType::Integer);
        assert_eq!("bool".parse::<AttributeType>().unwrap(), AttributeType::Boolean);
        assert!("float".parse::<AttributeType>().is_err());

        for ty in [AttributeType::String, AttributeType::Integer, AttributeType::Boolean] {
            assert_eq!(AttributeType::from_page_type(ty.page_type()).unwrap(), ty);
        }
        assert!(AttributeType::from_page_type(PageType::Object).is_err());
    }
}
