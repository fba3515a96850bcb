use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use crate::catalog::{AttributeDescription, TableDescription};
use crate::common::{
    DbError, PageId, PageType, Result, PAGE_BODY_SIZE, STRING_SIZE,
};

use super::codec::check_name;
use super::slotted_page::SlottedPage;

/// Catalog page: variable-length table records interleaved with free runs.
///
/// Record layout:
///   - length: i16 (bytes owned by the record, including any absorbed tail)
///   - attribute count: i16
///   - object page: i32
///   - table name: 64 bytes, space padded
///   - per attribute: name (64 bytes) + root page (i32)
pub struct CatalogPage {
    inner: SlottedPage,
}

impl CatalogPage {
    pub fn new(page_id: PageId) -> Self {
        Self {
            inner: SlottedPage::new(page_id, PageType::Catalog, None),
        }
    }

    pub fn from_page(inner: SlottedPage) -> Result<Self> {
        let found = inner.page_type()?;
        if found != PageType::Catalog {
            return Err(DbError::UnexpectedPageType {
                page: inner.page_id(),
                expected: PageType::Catalog,
                found,
            });
        }
        Ok(Self { inner })
    }

    /// Writes `table` into the first free run large enough. Returns `None`
    /// when this page has no room; a record that cannot fit any page is
    /// an error.
    pub fn insert(&mut self, table: &TableDescription) -> Result<Option<i16>> {
        let size = table.record_size();
        if size > PAGE_BODY_SIZE {
            return Err(DbError::RecordTooLarge {
                size,
                capacity: PAGE_BODY_SIZE,
            });
        }
        check_name(table.name(), STRING_SIZE)?;
        for attribute in table.attributes() {
            check_name(&attribute.name, STRING_SIZE)?;
        }

        let Some(extent) = self.inner.allocate(size)? else {
            return Ok(None);
        };

        let mut writer = self.inner.writer(extent.offset)?;
        writer.write_i16(extent.len as i16)?;
        writer.write_i16(table.attribute_count() as i16)?;
        writer.write_i32(table.object_page().as_i32())?;
        writer.write_padded_str(table.name(), STRING_SIZE)?;
        for attribute in table.attributes() {
            writer.write_padded_str(&attribute.name, STRING_SIZE)?;
            writer.write_i32(attribute.page_id.as_i32())?;
        }

        Ok(Some(extent.offset as i16))
    }

    fn decode(&self, offset: usize) -> Result<(usize, TableDescription)> {
        let mut reader = self.inner.reader(offset)?;
        let len = reader.read_i16()?;
        let count = reader.read_i16()?;
        if len <= 0 || count < 0 {
            return Err(DbError::CorruptRecord {
                page: self.inner.page_id(),
                offset,
            });
        }
        let object_page = PageId::new(reader.read_i32()?);
        let name = reader.read_padded_str(STRING_SIZE)?;
        let mut attributes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let attribute_name = reader.read_padded_str(STRING_SIZE)?;
            let page_id = PageId::new(reader.read_i32()?);
            attributes.push(AttributeDescription::new(attribute_name, page_id));
        }
        Ok((
            len as usize,
            TableDescription::new(name, object_page, attributes),
        ))
    }

    /// All records on this page, in body order. The body is tiled by
    /// records and free runs, so walking it front to back visits each once.
    pub fn records(&self) -> Result<Vec<(i16, TableDescription)>> {
        let free: HashMap<usize, usize> = self
            .inner
            .free_runs()?
            .into_iter()
            .map(|run| (run.offset, run.len))
            .collect();

        let mut records = Vec::new();
        let mut cursor = 0;
        while cursor < PAGE_BODY_SIZE {
            if let Some(len) = free.get(&cursor) {
                cursor += len;
                continue;
            }
            let (len, table) = self.decode(cursor)?;
            if cursor + len > PAGE_BODY_SIZE {
                return Err(DbError::CorruptRecord {
                    page: self.inner.page_id(),
                    offset: cursor,
                });
            }
            records.push((cursor as i16, table));
            cursor += len;
        }
        Ok(records)
    }

    pub fn find(&self, name: &str) -> Result<Option<(i16, TableDescription)>> {
        Ok(self
            .records()?
            .into_iter()
            .find(|(_, table)| table.name() == name))
    }

    /// Frees the record at `offset`.
    pub fn remove(&mut self, offset: i16) -> Result<()> {
        if offset < 0 {
            return Err(DbError::SlotOutOfRange {
                page: self.inner.page_id(),
                offset,
            });
        }
        let len = self.inner.reader(offset as usize)?.read_i16()?;
        self.inner.release(offset as usize, len.max(0) as usize)
    }

    pub fn into_inner(self) -> SlottedPage {
        self.inner
    }
}

impl Deref for CatalogPage {
    type Target = SlottedPage;

    fn deref(&self) -> &SlottedPage {
        &self.inner
    }
}

impl DerefMut for CatalogPage {
    fn deref_mut(&mut self) -> &mut SlottedPage {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, attributes: usize) -> TableDescription {
        TableDescription::new(
            name,
            PageId::new(2),
            (0..attributes)
                .map(|i| AttributeDescription::new(format!("attr{}", i), PageId::new(3 + i as i32)))
                .collect(),
        )
    }

    #[test]
    fn test_catalog_insert_and_find() {
        let mut page = CatalogPage::new(PageId::new(1));
        let users = table("users", 2);
        let offset = page.insert(&users).unwrap().unwrap();
        assert_eq!(offset, 0);
        page.insert(&table("orders", 3)).unwrap().unwrap();

        let (found_at, found) = page.find("users").unwrap().unwrap();
        assert_eq!(found_at, 0);
        assert_eq!(found, users);
        assert!(page.find("missing").unwrap().is_none());
        assert_eq!(page.records().unwrap().len(), 2);
    }

    #[test]
    fn test_catalog_remove_reuses_space() {
        let mut page = CatalogPage::new(PageId::new(1));
        let first = page.insert(&table("a", 1)).unwrap().unwrap();
        page.insert(&table("b", 1)).unwrap().unwrap();
        page.remove(first).unwrap();

        let names: Vec<_> = page
            .records()
            .unwrap()
            .into_iter()
            .map(|(_, t)| t.name().to_string())
            .collect();
        assert_eq!(names, vec!["b"]);

        // Same-sized record lands in the released run.
        assert_eq!(page.insert(&table("c", 1)).unwrap(), Some(first));
    }

    #[test]
    fn test_catalog_corrupt_length_is_reported() {
        let mut page = CatalogPage::new(PageId::new(1));
        let offset = page.insert(&table("a", 2)).unwrap().unwrap();
        page.inner.writer(offset as usize).unwrap().write_i16(0).unwrap();

        assert!(matches!(
            page.records(),
            Err(DbError::CorruptRecord { offset: 0, .. })
        ));
        assert!(page.find("a").is_err());
    }

    #[test]
    fn test_catalog_page_full_and_too_large() {
        let mut page = CatalogPage::new(PageId::new(1));
        // 72 + 58 * 68 = 4016 bytes, the tail of 70 bytes stays free
        page.insert(&table("big", 58)).unwrap().unwrap();
        assert_eq!(page.insert(&table("next", 1)).unwrap(), None);

        assert!(matches!(
            page.insert(&table("huge", 60)),
            Err(DbError::RecordTooLarge { .. })
        ));
    }
}
