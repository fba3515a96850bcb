use std::collections::HashSet;

use crate::common::{DbError, Result, STRING_SIZE};
use crate::storage::page::check_name;

use super::AttributeType;

/// One attribute requested at table creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    name: String,
    attribute_type: AttributeType,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }
}

/// Definition of a table to create: its name plus typed attributes in
/// row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    attributes: Vec<AttributeDefinition>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, attributes: Vec<AttributeDefinition>) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    /// Creates a schema builder for fluent construction.
    pub fn builder(name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[AttributeDefinition] {
        &self.attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Checks name widths, emptiness and duplicates. Whether the catalog
    /// record fits a page is only known when it is inserted.
    pub fn validate(&self) -> Result<()> {
        check_name(&self.name, STRING_SIZE)?;
        if self.attributes.is_empty() {
            return Err(DbError::EmptySchema(self.name.clone()));
        }
        let mut seen = HashSet::new();
        for attribute in &self.attributes {
            check_name(&attribute.name, STRING_SIZE)?;
            if !seen.insert(attribute.name.as_str()) {
                return Err(DbError::DuplicateAttribute {
                    table: self.name.clone(),
                    attribute: attribute.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for constructing table schemas fluently.
pub struct TableSchemaBuilder {
    name: String,
    attributes: Vec<AttributeDefinition>,
}

impl TableSchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attributes
            .push(AttributeDefinition::new(name, attribute_type));
        self
    }

    pub fn string(self, name: impl Into<String>) -> Self {
        self.attribute(name, AttributeType::String)
    }

    pub fn integer(self, name: impl Into<String>) -> Self {
        self.attribute(name, AttributeType::Integer)
    }

    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.attribute(name, AttributeType::Boolean)
    }

    pub fn build(self) -> TableSchema {
        TableSchema::new(self.name, self.attributes)
    }
}
