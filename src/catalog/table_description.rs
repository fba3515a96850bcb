use std::fmt;

use crate::common::{PageId, STRING_SIZE};

/// Fixed part of a catalog record: length (2) + attribute count (2) +
/// object page (4) + table name (64).
pub const CATALOG_RECORD_HEADER_SIZE: usize = 8 + STRING_SIZE;

/// Per-attribute part of a catalog record: name (64) + root page (4).
pub const CATALOG_ATTRIBUTE_SIZE: usize = STRING_SIZE + 4;

/// An attribute as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescription {
    pub name: String,
    /// Root of the attribute's value page chain
    pub page_id: PageId,
}

impl AttributeDescription {
    pub fn new(name: impl Into<String>, page_id: PageId) -> Self {
        Self {
            name: name.into(),
            page_id,
        }
    }
}

/// Catalog entry of a table: its object page chain root plus one value
/// page chain root per attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    name: String,
    object_page: PageId,
    attributes: Vec<AttributeDescription>,
}

impl TableDescription {
    pub fn new(
        name: impl Into<String>,
        object_page: PageId,
        attributes: Vec<AttributeDescription>,
    ) -> Self {
        Self {
            name: name.into(),
            object_page,
            attributes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object_page(&self) -> PageId {
        self.object_page
    }

    pub fn attributes(&self) -> &[AttributeDescription] {
        &self.attributes
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescription> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }

    /// Every page id rooted in this entry.
    pub fn root_pages(&self) -> Vec<PageId> {
        std::iter::once(self.object_page)
            .chain(self.attributes.iter().map(|a| a.page_id))
            .collect()
    }

    /// Serialized size of the catalog record.
    pub fn record_size(&self) -> usize {
        CATALOG_RECORD_HEADER_SIZE + self.attributes.len() * CATALOG_ATTRIBUTE_SIZE
    }

    pub fn with_object_page(mut self, object_page: PageId) -> Self {
        self.object_page = object_page;
        self
    }

    pub fn push_attribute(&mut self, attribute: AttributeDescription) {
        self.attributes.push(attribute);
    }
}

impl fmt::Display for TableDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @{} (", self.name, self.object_page.as_i32())?;
        for (i, attribute) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} @{}", attribute.name, attribute.page_id.as_i32())?;
        }
        write!(f, ")")
    }
}
