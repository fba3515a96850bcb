use std::collections::HashMap;

use parking_lot::Mutex;

use crate::common::{DbError, PageId, Result, PAGE_SIZE};

/// File I/O collaborator of the memory manager: whole pages in, whole
/// pages out, and growth by appending pages.
pub trait PageStore: Send + Sync {
    /// Reads page `page_id`. Fails for pages past the end of the file.
    fn load(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>>;

    /// Writes page `page_id`, which must already exist in the file.
    fn save(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()>;

    /// Grows the file to hold at least `total_pages` pages. Never shrinks.
    fn expand_file_if_needed(&self, total_pages: i32) -> Result<()>;

    /// Number of pages physically present.
    fn page_count(&self) -> Result<i32>;

    /// Forces written pages to stable storage.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Volatile `PageStore`, handy for tests and scratch databases.
#[derive(Default)]
pub struct MemoryStore {
    pages: Mutex<HashMap<PageId, Box<[u8; PAGE_SIZE]>>>,
    total_pages: Mutex<i32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageStore for MemoryStore {
    fn load(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        let total = *self.total_pages.lock();
        if !page_id.is_valid() || page_id.as_i32() >= total {
            return Err(DbError::PageOutOfBounds {
                page: page_id,
                total,
            });
        }
        Ok(self
            .pages
            .lock()
            .get(&page_id)
            .cloned()
            .unwrap_or_else(|| Box::new([0u8; PAGE_SIZE])))
    }

    fn save(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let total = *self.total_pages.lock();
        if !page_id.is_valid() || page_id.as_i32() >= total {
            return Err(DbError::PageOutOfBounds {
                page: page_id,
                total,
            });
        }
        self.pages.lock().insert(page_id, Box::new(*data));
        Ok(())
    }

    fn expand_file_if_needed(&self, total_pages: i32) -> Result<()> {
        let mut total = self.total_pages.lock();
        *total = (*total).max(total_pages);
        Ok(())
    }

    fn page_count(&self) -> Result<i32> {
        Ok(*self.total_pages.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_bounds() {
        let store = MemoryStore::new();
        assert_eq!(store.page_count().unwrap(), 0);
        assert!(store.load(PageId::new(0)).is_err());

        store.expand_file_if_needed(2).unwrap();
        store.expand_file_if_needed(1).unwrap();
        assert_eq!(store.page_count().unwrap(), 2);

        let mut data = [0u8; PAGE_SIZE];
        data[7] = 9;
        store.save(PageId::new(1), &data).unwrap();
        assert_eq!(store.load(PageId::new(1)).unwrap()[7], 9);
        assert_eq!(store.load(PageId::new(0)).unwrap()[7], 0);
        assert!(store.save(PageId::new(2), &data).is_err());
    }
}
