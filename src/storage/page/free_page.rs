use std::ops::{Deref, DerefMut};

use crate::common::{DbError, PageId, PageType, Result};

use super::slotted_page::SlottedPage;

/// A deallocated page. Its body holds only the index of the next free
/// page in the chain rooted in the header page.
pub struct FreePage {
    inner: SlottedPage,
}

impl FreePage {
    pub fn new(page_id: PageId, next_free: Option<PageId>) -> Result<Self> {
        let mut inner = SlottedPage::new(page_id, PageType::Free, None);
        inner.set_first_free(None);
        let mut page = Self { inner };
        page.set_next_free(next_free)?;
        Ok(page)
    }

    pub fn from_page(inner: SlottedPage) -> Result<Self> {
        let found = inner.page_type()?;
        if found != PageType::Free {
            return Err(DbError::UnexpectedPageType {
                page: inner.page_id(),
                expected: PageType::Free,
                found,
            });
        }
        Ok(Self { inner })
    }

    pub fn next_free(&self) -> Result<Option<PageId>> {
        Ok(PageId::from_link(self.inner.reader(0)?.read_i32()?))
    }

    pub fn set_next_free(&mut self, next_free: Option<PageId>) -> Result<()> {
        self.inner.writer(0)?.write_i32(PageId::to_link(next_free))
    }

    pub fn into_inner(self) -> SlottedPage {
        self.inner
    }
}

impl Deref for FreePage {
    type Target = SlottedPage;

    fn deref(&self) -> &SlottedPage {
        &self.inner
    }
}

impl DerefMut for FreePage {
    fn deref_mut(&mut self) -> &mut SlottedPage {
        &mut self.inner
    }
}
