use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::common::{
    DbError, PageId, Result, WorkerId, CATALOG_ROOT_PAGE_ID, HEADER_PAGE_ID,
};
use crate::storage::disk::PageStore;
use crate::storage::page::{CatalogPage, FreePage, HeaderPage, Page, SlottedPage};

use super::{Frame, LfuReplacer, PageHandle};

/// Cache bookkeeping, guarded by one mutex
struct CacheState {
    /// Resident pages
    frames: HashMap<PageId, PageHandle>,
    /// Pages reported dirty through `mark_dirty`
    dirty: HashSet<PageId>,
}

/// MemoryManager owns every live page. It loads pages from the store on a
/// miss, evicts the least frequently used unowned page when the cache is
/// full, writes dirty pages back, and manages whole-file space through the
/// header page and its free-page chain.
pub struct MemoryManager {
    store: Arc<dyn PageStore>,
    capacity: usize,
    state: Mutex<CacheState>,
    replacer: LfuReplacer,
    /// Serializes every writer of the header page
    header_lock: Mutex<()>,
}

impl MemoryManager {
    /// Opens the database held by `store`, formatting it first when the
    /// store is empty.
    pub fn open(store: Arc<dyn PageStore>, capacity: usize) -> Result<Self> {
        let manager = Self {
            store,
            capacity: capacity.max(2),
            state: Mutex::new(CacheState {
                frames: HashMap::new(),
                dirty: HashSet::new(),
            }),
            replacer: LfuReplacer::new(),
            header_lock: Mutex::new(()),
        };

        if manager.store.page_count()? == 0 {
            manager.format()?;
        } else {
            manager.validate()?;
        }
        Ok(manager)
    }

    fn format(&self) -> Result<()> {
        self.store.expand_file_if_needed(2)?;
        let header = HeaderPage::new(2)?;
        self.store.save(HEADER_PAGE_ID, header.data())?;
        let catalog = CatalogPage::new(CATALOG_ROOT_PAGE_ID);
        self.store.save(CATALOG_ROOT_PAGE_ID, catalog.data())?;
        info!(pages = 2, "formatted new database");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let frame = self.load_page(HEADER_PAGE_ID)?;
        let page = frame.lock();
        let header = page.as_header().map_err(|_| {
            DbError::InvalidDatabaseFile("page 0 is not a header page".to_string())
        })?;
        let total = header.total_pages()?;
        let present = self.store.page_count()?;
        if total < 2 || total > present {
            return Err(DbError::InvalidDatabaseFile(format!(
                "header counts {} pages, file holds {}",
                total, present
            )));
        }
        info!(pages = total, version = header.version()?, "opened database");
        Ok(())
    }

    /// Returns the cached page or reads it from the store. Pages sitting in
    /// the free chain cannot be loaded.
    pub fn load_page(&self, page_id: PageId) -> Result<PageHandle> {
        {
            let state = self.state.lock();
            if let Some(frame) = state.frames.get(&page_id) {
                self.replacer.record_access(page_id);
                return Ok(Arc::clone(frame));
            }
        }

        let total = self.store.page_count()?;
        if !page_id.is_valid() || page_id.as_i32() >= total {
            return Err(DbError::PageOutOfBounds {
                page: page_id,
                total,
            });
        }
        let page = Page::from_bytes(page_id, self.store.load(page_id)?)?;
        if let Page::Free(_) = page {
            return Err(DbError::FreePageAccess(page_id));
        }

        let mut state = self.state.lock();
        // Another thread may have loaded it while the lock was released.
        if let Some(frame) = state.frames.get(&page_id) {
            self.replacer.record_access(page_id);
            return Ok(Arc::clone(frame));
        }
        self.make_room(&mut state)?;
        let frame = Arc::new(Frame::new(page, None));
        state.frames.insert(page_id, Arc::clone(&frame));
        self.replacer.record_access(page_id);
        trace!(page = page_id.as_i32(), "loaded page");
        Ok(frame)
    }

    /// Evicts pages until there is room for one more. Owned or borrowed
    /// pages are never evicted; when every page is in use the cache is
    /// allowed to run over capacity.
    fn make_room(&self, state: &mut CacheState) -> Result<()> {
        while state.frames.len() >= self.capacity {
            let frames = &state.frames;
            let victim = self
                .replacer
                .evict(|page_id| frames.get(&page_id).map_or(true, Frame::is_evictable));
            let Some(victim) = victim else {
                debug!(cached = state.frames.len(), "page cache over capacity");
                return Ok(());
            };
            let Some(frame) = state.frames.remove(&victim) else {
                continue;
            };

            let marked = state.dirty.contains(&victim);
            let written = {
                let mut page = frame.lock();
                if page.is_dirty() || marked {
                    let result = self.store.save(victim, page.data());
                    if result.is_ok() {
                        page.mark_clean();
                    }
                    Some(result)
                } else {
                    None
                }
            };
            if let Some(Err(err)) = written {
                state.frames.insert(victim, frame);
                self.replacer.record_access(victim);
                return Err(err);
            }
            state.dirty.remove(&victim);
            debug!(page = victim.as_i32(), dirty = written.is_some(), "evicted page");
        }
        Ok(())
    }

    /// Takes a page from the head of the free chain, or grows the file by
    /// one page. The returned frame holds a free-page placeholder owned by
    /// `owner` until `exchange_page` installs the real page.
    pub fn allocate_page(&self, owner: Option<WorkerId>) -> Result<PageHandle> {
        let _guard = self.header_lock.lock();
        let header_frame = self.load_page(HEADER_PAGE_ID)?;
        let page_id = {
            let mut page = header_frame.lock();
            let header = page.as_header_mut()?;
            match header.first_free_page()? {
                Some(free_id) => {
                    let bytes = self.store.load(free_id)?;
                    let free = FreePage::from_page(SlottedPage::from_bytes(free_id, bytes))?;
                    header.set_first_free_page(free.next_free()?)?;
                    debug!(page = free_id.as_i32(), "reused page from free chain");
                    free_id
                }
                None => {
                    let total = header.total_pages()?;
                    let grown = total.checked_add(1).ok_or(DbError::FileExhausted(total))?;
                    self.store.expand_file_if_needed(grown)?;
                    header.set_total_pages(grown)?;
                    debug!(page = total, "grew file by one page");
                    PageId::new(total)
                }
            }
        };
        drop(header_frame);
        self.mark_dirty(HEADER_PAGE_ID);

        let placeholder: Page = FreePage::new(page_id, None)?.into();
        let frame = Arc::new(Frame::new(placeholder, owner));
        let mut state = self.state.lock();
        self.make_room(&mut state)?;
        state.frames.insert(page_id, Arc::clone(&frame));
        self.replacer.record_access(page_id);
        Ok(frame)
    }

    /// Overwrites `page_id` with a free-page record linked to the previous
    /// chain head and drops it from the cache.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        if page_id == HEADER_PAGE_ID || page_id == CATALOG_ROOT_PAGE_ID {
            return Err(DbError::ReservedPage(page_id));
        }

        let _guard = self.header_lock.lock();
        let header_frame = self.load_page(HEADER_PAGE_ID)?;
        {
            let mut page = header_frame.lock();
            let header = page.as_header_mut()?;
            let free = FreePage::new(page_id, header.first_free_page()?)?;
            self.store.save(page_id, free.data())?;
            header.set_first_free_page(Some(page_id))?;
        }
        drop(header_frame);
        self.mark_dirty(HEADER_PAGE_ID);

        let mut state = self.state.lock();
        state.frames.remove(&page_id);
        state.dirty.remove(&page_id);
        self.replacer.remove(page_id);
        debug!(page = page_id.as_i32(), "returned page to free chain");
        Ok(())
    }

    /// Replaces the cached page object for `page.page_id()`, typically when
    /// a freshly allocated page receives its concrete type.
    pub fn exchange_page(&self, page: Page, owner: Option<WorkerId>) -> Result<PageHandle> {
        let page_id = page.page_id();
        let mut page = page;
        page.mark_dirty();
        let frame = Arc::new(Frame::new(page, owner));

        let mut state = self.state.lock();
        if !state.frames.contains_key(&page_id) {
            self.make_room(&mut state)?;
        }
        state.frames.insert(page_id, Arc::clone(&frame));
        state.dirty.insert(page_id);
        self.replacer.record_access(page_id);
        Ok(frame)
    }

    /// Flags `page_id` for write-back even if its bytes were not touched
    /// through the page itself.
    pub fn mark_dirty(&self, page_id: PageId) {
        self.state.lock().dirty.insert(page_id);
    }

    pub fn is_dirty(&self, page_id: PageId) -> bool {
        let frame = {
            let state = self.state.lock();
            if state.dirty.contains(&page_id) {
                return true;
            }
            match state.frames.get(&page_id) {
                Some(frame) => Arc::clone(frame),
                None => return false,
            }
        };
        frame.is_dirty()
    }

    /// Writes `page_id` back if it is cached and dirty. Returns whether a
    /// write happened.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let (frame, marked) = {
            let state = self.state.lock();
            match state.frames.get(&page_id) {
                Some(frame) => (Arc::clone(frame), state.dirty.contains(&page_id)),
                None => return Ok(false),
            }
        };

        let mut page = frame.lock();
        if !page.is_dirty() && !marked {
            return Ok(false);
        }
        self.store.save(page_id, page.data())?;
        page.mark_clean();
        self.state.lock().dirty.remove(&page_id);
        trace!(page = page_id.as_i32(), "flushed page");
        Ok(true)
    }

    /// Writes back every dirty cached page and syncs the store.
    pub fn flush_all(&self) -> Result<()> {
        for page_id in self.cached_pages() {
            self.flush_page(page_id)?;
        }
        self.store.sync()
    }

    pub fn total_pages(&self) -> Result<i32> {
        let frame = self.load_page(HEADER_PAGE_ID)?;
        let page = frame.lock();
        page.as_header()?.total_pages()
    }

    pub fn first_free_page(&self) -> Result<Option<PageId>> {
        let frame = self.load_page(HEADER_PAGE_ID)?;
        let page = frame.lock();
        page.as_header()?.first_free_page()
    }

    /// Ids of the resident pages, ascending.
    pub fn cached_pages(&self) -> Vec<PageId> {
        let mut pages: Vec<PageId> = self.state.lock().frames.keys().copied().collect();
        pages.sort();
        pages
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.state.lock().frames.contains_key(&page_id)
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        let _ = self.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PageType;
    use crate::storage::disk::MemoryStore;
    use crate::storage::page::StringPage;

    fn manager(capacity: usize) -> MemoryManager {
        MemoryManager::open(Arc::new(MemoryStore::new()), capacity).unwrap()
    }

    #[test]
    fn test_open_formats_empty_store() {
        let mm = manager(8);
        assert_eq!(mm.total_pages().unwrap(), 2);
        assert_eq!(mm.first_free_page().unwrap(), None);

        let catalog = mm.load_page(CATALOG_ROOT_PAGE_ID).unwrap();
        assert_eq!(catalog.lock().page_type(), PageType::Catalog);
    }

    #[test]
    fn test_allocate_grows_then_reuses() {
        let mm = manager(8);
        let frame = mm.allocate_page(None).unwrap();
        assert_eq!(frame.page_id(), PageId::new(2));
        assert_eq!(mm.total_pages().unwrap(), 3);

        mm.exchange_page(StringPage::new(PageId::new(2)).into(), None)
            .unwrap();
        mm.delete_page(PageId::new(2)).unwrap();
        assert_eq!(mm.first_free_page().unwrap(), Some(PageId::new(2)));
        assert!(matches!(
            mm.load_page(PageId::new(2)),
            Err(DbError::FreePageAccess(_))
        ));

        let again = mm.allocate_page(None).unwrap();
        assert_eq!(again.page_id(), PageId::new(2));
        assert_eq!(mm.first_free_page().unwrap(), None);
        assert_eq!(mm.total_pages().unwrap(), 3);
    }

    #[test]
    fn test_reserved_pages_cannot_be_deleted() {
        let mm = manager(8);
        assert!(matches!(
            mm.delete_page(HEADER_PAGE_ID),
            Err(DbError::ReservedPage(_))
        ));
        assert!(mm.delete_page(CATALOG_ROOT_PAGE_ID).is_err());
    }

    #[test]
    fn test_dirty_tracking_until_flush() {
        let mm = manager(8);
        let page_id = mm.allocate_page(None).unwrap().page_id();
        mm.exchange_page(StringPage::new(page_id).into(), None)
            .unwrap();
        assert!(mm.is_dirty(page_id));
        assert!(mm.flush_page(page_id).unwrap());
        assert!(!mm.is_dirty(page_id));
        assert!(!mm.flush_page(page_id).unwrap());

        mm.mark_dirty(page_id);
        assert!(mm.is_dirty(page_id));
        assert!(mm.flush_page(page_id).unwrap());
        assert!(!mm.is_dirty(PageId::new(40)));
    }

    #[test]
    fn test_out_of_bounds_load() {
        let mm = manager(8);
        assert!(matches!(
            mm.load_page(PageId::new(9)),
            Err(DbError::PageOutOfBounds { .. })
        ));
    }
}
