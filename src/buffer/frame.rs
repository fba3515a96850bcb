use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::common::{PageId, WorkerId};
use crate::storage::page::Page;

/// A cached page plus the worker that currently owns it.
///
/// Ownership is granted by the resource manager; page bytes are guarded
/// by their own mutex so that readers of different pages never contend.
pub struct Frame {
    page_id: PageId,
    owner: Mutex<Option<WorkerId>>,
    page: Mutex<Page>,
}

/// Shared handle to a cached frame.
pub type PageHandle = Arc<Frame>;

impl Frame {
    pub fn new(page: Page, owner: Option<WorkerId>) -> Self {
        Self {
            page_id: page.page_id(),
            owner: Mutex::new(owner),
            page: Mutex::new(page),
        }
    }

    /// Returns the page ID stored in this frame.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Locks the page for reading or writing.
    pub fn lock(&self) -> MutexGuard<'_, Page> {
        self.page.lock()
    }

    pub fn owner(&self) -> Option<WorkerId> {
        *self.owner.lock()
    }

    /// Claims the frame for `worker`. Succeeds when the frame is unowned or
    /// already owned by `worker`.
    pub(crate) fn try_claim(&self, worker: WorkerId) -> bool {
        let mut owner = self.owner.lock();
        match *owner {
            Some(current) if current != worker => false,
            _ => {
                *owner = Some(worker);
                true
            }
        }
    }

    /// Gives up ownership if `worker` holds it. Returns whether it did.
    pub(crate) fn release(&self, worker: WorkerId) -> bool {
        let mut owner = self.owner.lock();
        if *owner == Some(worker) {
            *owner = None;
            true
        } else {
            false
        }
    }

    /// A frame can leave the cache when nobody owns it and the cache holds
    /// the only handle.
    pub(crate) fn is_evictable(frame: &PageHandle) -> bool {
        if Arc::strong_count(frame) > 1 {
            return false;
        }
        match frame.owner.try_lock() {
            Some(owner) => owner.is_none(),
            None => false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.page.lock().is_dirty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::ObjectPage;

    fn frame() -> PageHandle {
        Arc::new(Frame::new(ObjectPage::new(PageId::new(2), 1).unwrap().into(), None))
    }

    #[test]
    fn test_frame_claim_and_release() {
        let frame = frame();
        let a = WorkerId::new(1);
        let b = WorkerId::new(2);

        assert!(frame.try_claim(a));
        assert!(frame.try_claim(a));
        assert!(!frame.try_claim(b));
        assert!(!frame.release(b));
        assert!(frame.release(a));
        assert_eq!(frame.owner(), None);
        assert!(frame.try_claim(b));
    }

    #[test]
    fn test_frame_evictability() {
        let frame = frame();
        assert!(Frame::is_evictable(&frame));

        let extra = Arc::clone(&frame);
        assert!(!Frame::is_evictable(&frame));
        drop(extra);

        frame.try_claim(WorkerId::new(1));
        assert!(!Frame::is_evictable(&frame));
    }
}
