use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::PageId;

/// Access statistics for a single cached page
#[derive(Debug, Clone, Copy)]
struct PageAccessInfo {
    /// Number of recorded accesses since the page entered the cache
    count: u64,
    /// Logical time of the most recent access
    last_access: u64,
}

/// Least-Frequently-Used replacement policy.
///
/// The victim is the page with the lowest access count among those the
/// caller reports as evictable. Ties go to the page accessed least
/// recently.
pub struct LfuReplacer {
    /// Logical clock, bumped on every access
    current_timestamp: AtomicU64,
    /// Access information per cached page
    page_info: Mutex<HashMap<PageId, PageAccessInfo>>,
}

impl LfuReplacer {
    pub fn new() -> Self {
        Self {
            current_timestamp: AtomicU64::new(0),
            page_info: Mutex::new(HashMap::new()),
        }
    }

    /// Records one access to `page_id`.
    pub fn record_access(&self, page_id: PageId) {
        let timestamp = self.current_timestamp.fetch_add(1, Ordering::Relaxed);
        let mut page_info = self.page_info.lock();
        let info = page_info.entry(page_id).or_insert(PageAccessInfo {
            count: 0,
            last_access: timestamp,
        });
        info.count += 1;
        info.last_access = timestamp;
    }

    /// Picks and forgets the least frequently used page for which
    /// `is_evictable` holds. Returns None if there is no such page.
    pub fn evict(&self, is_evictable: impl Fn(PageId) -> bool) -> Option<PageId> {
        let mut page_info = self.page_info.lock();

        let mut candidates: Vec<(PageId, PageAccessInfo)> =
            page_info.iter().map(|(id, info)| (*id, *info)).collect();
        candidates.sort_by_key(|(_, info)| (info.count, info.last_access));

        let victim = candidates
            .into_iter()
            .map(|(page_id, _)| page_id)
            .find(|page_id| is_evictable(*page_id))?;
        page_info.remove(&victim);
        Some(victim)
    }

    /// Stops tracking `page_id`.
    pub fn remove(&self, page_id: PageId) {
        self.page_info.lock().remove(&page_id);
    }

    pub fn access_count(&self, page_id: PageId) -> Option<u64> {
        self.page_info.lock().get(&page_id).map(|info| info.count)
    }

    /// Returns the number of tracked pages.
    pub fn size(&self) -> usize {
        self.page_info.lock().len()
    }
}

impl Default for LfuReplacer {
    fn default() -> Self {
        Self::new()
    }
}
