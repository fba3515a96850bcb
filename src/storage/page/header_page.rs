use std::ops::{Deref, DerefMut};

use crate::common::{
    DbError, PageId, PageType, Result, FORMAT_VERSION, HEADER_MAGIC, HEADER_PAGE_ID,
};

use super::slotted_page::SlottedPage;

/// Header page body layout (offsets relative to the body):
///
/// | Field            | Offset | Size |
/// |------------------|--------|------|
/// | magic            | 0      | 11   |
/// | format version   | 11     | 4    |
/// | first free page  | 15     | 4    |
/// | total page count | 19     | 4    |
const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = MAGIC_OFFSET + HEADER_MAGIC.len();
const FIRST_FREE_PAGE_OFFSET: usize = VERSION_OFFSET + 4;
const TOTAL_PAGES_OFFSET: usize = FIRST_FREE_PAGE_OFFSET + 4;

/// Page 0 of every database file. Holds the head of the free-page chain
/// and the number of pages in the file.
pub struct HeaderPage {
    inner: SlottedPage,
}

impl HeaderPage {
    /// Formats a header for a brand new file holding `total_pages` pages.
    pub fn new(total_pages: i32) -> Result<Self> {
        let mut inner = SlottedPage::new(HEADER_PAGE_ID, PageType::Header, None);
        inner.set_first_free(None);
        let mut page = Self { inner };
        page.inner.writer(MAGIC_OFFSET)?.write_bytes(HEADER_MAGIC)?;
        page.inner.writer(VERSION_OFFSET)?.write_i32(FORMAT_VERSION)?;
        page.set_first_free_page(None)?;
        page.set_total_pages(total_pages)?;
        Ok(page)
    }

    /// Validates a page loaded from disk as a header page.
    pub fn from_page(inner: SlottedPage) -> Result<Self> {
        let found = inner.page_type()?;
        if found != PageType::Header {
            return Err(DbError::UnexpectedPageType {
                page: inner.page_id(),
                expected: PageType::Header,
                found,
            });
        }
        let page = Self { inner };
        if !page.has_valid_magic()? {
            return Err(DbError::InvalidDatabaseFile(
                "header page magic mismatch".to_string(),
            ));
        }
        Ok(page)
    }

    pub fn has_valid_magic(&self) -> Result<bool> {
        let magic = self
            .inner
            .reader(MAGIC_OFFSET)?
            .read_bytes(HEADER_MAGIC.len())?;
        Ok(magic == HEADER_MAGIC)
    }

    pub fn version(&self) -> Result<i32> {
        self.inner.reader(VERSION_OFFSET)?.read_i32()
    }

    pub fn first_free_page(&self) -> Result<Option<PageId>> {
        let raw = self.inner.reader(FIRST_FREE_PAGE_OFFSET)?.read_i32()?;
        Ok(PageId::from_link(raw))
    }

    pub fn set_first_free_page(&mut self, page_id: Option<PageId>) -> Result<()> {
        self.inner
            .writer(FIRST_FREE_PAGE_OFFSET)?
            .write_i32(PageId::to_link(page_id))
    }

    pub fn total_pages(&self) -> Result<i32> {
        self.inner.reader(TOTAL_PAGES_OFFSET)?.read_i32()
    }

    pub fn set_total_pages(&mut self, total: i32) -> Result<()> {
        self.inner.writer(TOTAL_PAGES_OFFSET)?.write_i32(total)
    }

    pub fn into_inner(self) -> SlottedPage {
        self.inner
    }
}

impl Deref for HeaderPage {
    type Target = SlottedPage;

    fn deref(&self) -> &SlottedPage {
        &self.inner
    }
}

impl DerefMut for HeaderPage {
    fn deref_mut(&mut self) -> &mut SlottedPage {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{PAGE_HEADER_SIZE, PAGE_SIZE};

    #[test]
    fn test_header_page_init() {
        let page = HeaderPage::new(2).unwrap();
        assert!(page.has_valid_magic().unwrap());
        assert_eq!(page.version().unwrap(), FORMAT_VERSION);
        assert_eq!(page.first_free_page().unwrap(), None);
        assert_eq!(page.total_pages().unwrap(), 2);
        assert_eq!(page.first_free(), None);

        let data = page.data();
        assert_eq!(
            &data[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + 11],
            b"PROJECTDATA"
        );
    }

    #[test]
    fn test_header_page_persistence() {
        let mut page = HeaderPage::new(1).unwrap();
        page.set_first_free_page(Some(PageId::new(5))).unwrap();
        page.set_total_pages(9).unwrap();

        let bytes = Box::new(*page.data());
        let reloaded = HeaderPage::from_page(SlottedPage::from_bytes(HEADER_PAGE_ID, bytes)).unwrap();
        assert_eq!(reloaded.first_free_page().unwrap(), Some(PageId::new(5)));
        assert_eq!(reloaded.total_pages().unwrap(), 9);
    }

    #[test]
    fn test_header_page_rejects_bad_magic() {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[..2].copy_from_slice(&PageType::Header.code().to_be_bytes());
        let result = HeaderPage::from_page(SlottedPage::from_bytes(HEADER_PAGE_ID, data));
        assert!(matches!(result, Err(DbError::InvalidDatabaseFile(_))));
    }
}
