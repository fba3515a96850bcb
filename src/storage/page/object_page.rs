use std::ops::{Deref, DerefMut};

use crate::common::{Address, DbError, PageId, PageType, Result, ADDRESS_SIZE, PAGE_BODY_SIZE};

use super::slotted_page::SlottedPage;

/// Object page: fixed-size rows of one `Address` per attribute.
///
/// The attribute count is not stored separately; it is the page's record
/// size divided by the address width.
pub struct ObjectPage {
    inner: SlottedPage,
}

impl ObjectPage {
    /// Fails when a row of `attribute_count` addresses cannot fit a page.
    pub fn new(page_id: PageId, attribute_count: usize) -> Result<Self> {
        let row_size = attribute_count.max(1) * ADDRESS_SIZE;
        if row_size > PAGE_BODY_SIZE {
            return Err(DbError::RecordTooLarge {
                size: row_size,
                capacity: PAGE_BODY_SIZE,
            });
        }
        Ok(Self {
            inner: SlottedPage::new(page_id, PageType::Object, Some(row_size)),
        })
    }

    pub fn from_page(inner: SlottedPage) -> Result<Self> {
        let found = inner.page_type()?;
        if found != PageType::Object {
            return Err(DbError::UnexpectedPageType {
                page: inner.page_id(),
                expected: PageType::Object,
                found,
            });
        }
        if inner.record_size().is_none() {
            return Err(DbError::InvalidDatabaseFile(format!(
                "object page {} has no row size",
                inner.page_id()
            )));
        }
        Ok(Self { inner })
    }

    pub fn attribute_count(&self) -> usize {
        self.inner.record_size().unwrap_or(0) / ADDRESS_SIZE
    }

    /// Stores a row and returns its slot offset, or `None` when the page
    /// is full.
    pub fn insert(&mut self, row: &[Address]) -> Result<Option<i16>> {
        let count = self.attribute_count();
        if row.len() > count {
            return Err(DbError::RecordTooLarge {
                size: row.len() * ADDRESS_SIZE,
                capacity: count * ADDRESS_SIZE,
            });
        }
        let Some(extent) = self.inner.allocate(count * ADDRESS_SIZE)? else {
            return Ok(None);
        };
        let mut writer = self.inner.writer(extent.offset)?;
        for i in 0..count {
            writer.write_address(row.get(i).copied().unwrap_or(Address::NULL))?;
        }
        Ok(Some(extent.offset as i16))
    }

    pub fn row(&self, offset: i16) -> Result<Vec<Address>> {
        let start = self.inner.check_slot(offset)?;
        let mut reader = self.inner.reader(start)?;
        (0..self.attribute_count())
            .map(|_| reader.read_address())
            .collect()
    }

    /// Overwrites the address of attribute `index` in the row at `offset`.
    pub fn set_entry(&mut self, offset: i16, index: usize, address: Address) -> Result<()> {
        let start = self.inner.check_slot(offset)?;
        if index >= self.attribute_count() {
            return Err(DbError::SlotOutOfRange {
                page: self.inner.page_id(),
                offset,
            });
        }
        self.inner
            .writer(start + index * ADDRESS_SIZE)?
            .write_address(address)
    }

    pub fn remove(&mut self, offset: i16) -> Result<()> {
        self.inner.release_slot(offset)
    }

    /// Occupied rows, ascending by offset.
    pub fn rows(&self) -> Result<Vec<(i16, Vec<Address>)>> {
        self.inner
            .used_slots()?
            .into_iter()
            .map(|offset| {
                let offset = offset as i16;
                Ok((offset, self.row(offset)?))
            })
            .collect()
    }

    pub fn into_inner(self) -> SlottedPage {
        self.inner
    }
}

impl Deref for ObjectPage {
    type Target = SlottedPage;

    fn deref(&self) -> &SlottedPage {
        &self.inner
    }
}

impl DerefMut for ObjectPage {
    fn deref_mut(&mut self) -> &mut SlottedPage {
        &mut self.inner
    }
}
