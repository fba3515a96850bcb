use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::buffer::{MemoryManager, PageHandle};
use crate::common::{DbError, EngineConfig, PageId, Result, WorkerId};
use crate::storage::page::Page;

use super::WaitForGraph;

/// Ownership and waiting state. Every change happens under the graph lock.
#[derive(Default)]
struct GraphState {
    /// Pages held per worker
    held: HashMap<WorkerId, BTreeSet<PageId>>,
    /// Owner per held page
    owners: HashMap<PageId, WorkerId>,
    /// Pages each blocked worker is waiting for
    waiting: HashMap<WorkerId, BTreeSet<PageId>>,
    /// Waiting workers asked to give up
    interrupted: HashSet<WorkerId>,
}

impl GraphState {
    /// Snapshot of who waits on whom, leaving out the stale wait entry of
    /// `requester`.
    fn wait_for_graph(&self, requester: WorkerId) -> WaitForGraph {
        let mut graph = WaitForGraph::new();
        for (worker, pages) in self.waiting.iter().filter(|(w, _)| **w != requester) {
            for page_id in pages {
                if let Some(owner) = self.owners.get(page_id) {
                    graph.add_edge(*worker, *owner);
                }
            }
        }
        graph
    }

    fn grant(&mut self, worker: WorkerId, page_id: PageId) {
        self.owners.insert(page_id, worker);
        self.held.entry(worker).or_default().insert(page_id);
    }

    fn revoke(&mut self, worker: WorkerId, page_id: PageId) -> bool {
        if self.owners.get(&page_id) != Some(&worker) {
            return false;
        }
        self.owners.remove(&page_id);
        if let Some(pages) = self.held.get_mut(&worker) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&worker);
            }
        }
        true
    }
}

/// Gate-keeps page access between concurrent workers.
///
/// Multi-page requests are sorted before locking, so callers that go
/// through this manager can never wait on each other in a circle. On top
/// of that, each blocked attempt is checked against a wait-for graph and
/// denied immediately if it would close a cycle. Contended requests wait
/// on a condition variable with a bounded timeout and retry.
pub struct ResourceManager {
    memory: Arc<MemoryManager>,
    graph: Mutex<GraphState>,
    wakeup: Condvar,
    max_retries: i32,
    retry_delay: Duration,
}

impl ResourceManager {
    pub fn new(memory: Arc<MemoryManager>, config: &EngineConfig) -> Self {
        Self {
            memory,
            graph: Mutex::new(GraphState::default()),
            wakeup: Condvar::new(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    /// Acquires `pages` for `worker` with the configured retry policy.
    pub fn acquire_default(&self, worker: WorkerId, pages: &[PageId]) -> Result<Vec<PageHandle>> {
        self.acquire(worker, pages, self.max_retries, self.retry_delay)
    }

    /// Acquires every page in `pages` for `worker`, or none of them.
    ///
    /// Handles come back sorted by page id with duplicates removed. Pages the
    /// worker already owns are re-granted without conflict. After
    /// `max_retries` failed attempts (-1 = retry forever) the request is
    /// denied with `DbError::Denied`.
    pub fn acquire(
        &self,
        worker: WorkerId,
        pages: &[PageId],
        max_retries: i32,
        retry_delay: Duration,
    ) -> Result<Vec<PageHandle>> {
        let mut requested: Vec<PageId> = pages.to_vec();
        requested.sort();
        requested.dedup();

        let mut attempts: u32 = 0;
        let mut state = self.graph.lock();
        loop {
            if state.interrupted.remove(&worker) {
                state.waiting.remove(&worker);
                debug!(%worker, "acquisition interrupted");
                return Err(DbError::Interrupted { worker });
            }

            let contested: Vec<WorkerId> = requested
                .iter()
                .filter_map(|page_id| state.owners.get(page_id))
                .filter(|owner| **owner != worker)
                .copied()
                .collect();

            if contested.is_empty() {
                match self.claim(&mut state, worker, &requested) {
                    Ok(Some(handles)) => {
                        state.waiting.remove(&worker);
                        return Ok(handles);
                    }
                    Ok(None) => {}
                    Err(err) => {
                        state.waiting.remove(&worker);
                        return Err(err);
                    }
                }
            } else {
                let graph = state.wait_for_graph(worker);
                if graph.would_form_cycle(worker, &contested) {
                    state.waiting.remove(&worker);
                    debug!(%worker, pages = ?requested, "denied: request would deadlock");
                    return Err(DbError::Denied {
                        worker,
                        pages: requested,
                        attempts,
                    });
                }
            }

            attempts += 1;
            if max_retries >= 0 && attempts > max_retries as u32 {
                state.waiting.remove(&worker);
                warn!(%worker, pages = ?requested, attempts, "denied: retries exhausted");
                return Err(DbError::Denied {
                    worker,
                    pages: requested,
                    attempts,
                });
            }

            debug!(%worker, attempt = attempts, "waiting for pages");
            state
                .waiting
                .insert(worker, requested.iter().copied().collect());
            self.wakeup.wait_for(&mut state, retry_delay);
        }
    }

    /// Like `acquire`, for a worker that already holds pages and needs more
    /// without letting go of what it has.
    pub fn expand(&self, worker: WorkerId, pages: &[PageId]) -> Result<Vec<PageHandle>> {
        let held = self.held_pages(worker).len();
        debug!(%worker, held, extra = pages.len(), "expanding zone");
        self.acquire_default(worker, pages)
    }

    /// Locks each page's owner slot in ascending order. Returns `None` when a
    /// faster worker got one of them first; everything claimed so far is
    /// rolled back in that case.
    fn claim(
        &self,
        state: &mut MutexGuard<'_, GraphState>,
        worker: WorkerId,
        requested: &[PageId],
    ) -> Result<Option<Vec<PageHandle>>> {
        let mut handles: Vec<PageHandle> = Vec::with_capacity(requested.len());
        let mut newly_claimed: Vec<PageHandle> = Vec::new();

        for page_id in requested {
            let handle = match self.memory.load_page(*page_id) {
                Ok(handle) => handle,
                Err(err) => {
                    Self::undo_claims(worker, &newly_claimed);
                    return Err(err);
                }
            };
            let already_owned = handle.owner() == Some(worker);
            if !handle.try_claim(worker) {
                Self::undo_claims(worker, &newly_claimed);
                return Ok(None);
            }
            if !already_owned {
                newly_claimed.push(Arc::clone(&handle));
            }
            handles.push(handle);
        }

        for handle in &handles {
            state.grant(worker, handle.page_id());
        }
        Ok(Some(handles))
    }

    fn undo_claims(worker: WorkerId, claimed: &[PageHandle]) {
        for handle in claimed {
            handle.release(worker);
        }
    }

    /// Allocates a fresh page owned by `worker`. The handle holds a
    /// free-page placeholder until `exchange` installs the typed page.
    pub fn allocate(&self, worker: WorkerId) -> Result<PageHandle> {
        let mut state = self.graph.lock();
        let handle = self.memory.allocate_page(Some(worker))?;
        state.grant(worker, handle.page_id());
        Ok(handle)
    }

    /// Installs `page` in place of the cached page with the same id, keeping
    /// `worker` as its owner.
    pub fn exchange(&self, worker: WorkerId, page: Page) -> Result<PageHandle> {
        let page_id = page.page_id();
        let state = self.graph.lock();
        if state.owners.get(&page_id) != Some(&worker) {
            return Err(DbError::NotOwner {
                worker,
                page: page_id,
            });
        }
        let handle = self.memory.exchange_page(page, Some(worker))?;
        drop(state);
        Ok(handle)
    }

    /// Returns owned pages to the free chain.
    pub fn delete(&self, worker: WorkerId, pages: &[PageId]) -> Result<()> {
        let mut state = self.graph.lock();
        if let Some(page_id) = pages
            .iter()
            .find(|page_id| state.owners.get(*page_id) != Some(&worker))
        {
            return Err(DbError::NotOwner {
                worker,
                page: *page_id,
            });
        }
        for page_id in pages {
            self.memory.delete_page(*page_id)?;
            state.revoke(worker, *page_id);
        }
        drop(state);
        self.wakeup.notify_all();
        Ok(())
    }

    /// Gives up the listed pages, flushes the dirty ones and wakes waiters.
    /// Pages the worker does not own are ignored.
    pub fn release(&self, worker: WorkerId, pages: &[PageId]) -> Result<()> {
        let mut released = Vec::new();
        {
            let mut state = self.graph.lock();
            for page_id in pages {
                if state.revoke(worker, *page_id) {
                    if let Ok(handle) = self.memory.load_page(*page_id) {
                        handle.release(worker);
                    }
                    released.push(*page_id);
                }
            }
        }
        self.wakeup.notify_all();
        self.flush(&released)
    }

    /// Releases everything `worker` holds.
    pub fn release_all(&self, worker: WorkerId) -> Result<()> {
        let pages = self.held_pages(worker);
        {
            let mut state = self.graph.lock();
            state.waiting.remove(&worker);
            state.interrupted.remove(&worker);
        }
        self.release(worker, &pages)
    }

    fn flush(&self, pages: &[PageId]) -> Result<()> {
        let mut first_error = None;
        for page_id in pages {
            if let Err(err) = self.memory.flush_page(*page_id) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Pages currently held by `worker`, ascending.
    pub fn held_pages(&self, worker: WorkerId) -> Vec<PageId> {
        self.graph
            .lock()
            .held
            .get(&worker)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn owner_of(&self, page_id: PageId) -> Option<WorkerId> {
        self.graph.lock().owners.get(&page_id).copied()
    }

    /// Wakes a blocked acquisition of `worker`, which then fails with
    /// `DbError::Interrupted`. Returns false if the worker is not waiting.
    pub fn interrupt(&self, worker: WorkerId) -> bool {
        let mut state = self.graph.lock();
        if !state.waiting.contains_key(&worker) {
            return false;
        }
        state.interrupted.insert(worker);
        drop(state);
        self.wakeup.notify_all();
        true
    }

    /// Number of workers blocked in `acquire`.
    pub fn waiting_workers(&self) -> usize {
        self.graph.lock().waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CATALOG_ROOT_PAGE_ID;
    use crate::storage::disk::MemoryStore;
    use crate::storage::page::StringPage;

    fn manager() -> ResourceManager {
        let memory = Arc::new(MemoryManager::open(Arc::new(MemoryStore::new()), 16).unwrap());
        ResourceManager::new(memory, &EngineConfig::default())
    }

    #[test]
    fn test_acquire_and_release() {
        let rm = manager();
        let worker = WorkerId::new(1);
        let handles = rm.acquire_default(worker, &[CATALOG_ROOT_PAGE_ID]).unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].owner(), Some(worker));
        assert_eq!(rm.held_pages(worker), vec![CATALOG_ROOT_PAGE_ID]);

        rm.release_all(worker).unwrap();
        assert!(rm.held_pages(worker).is_empty());
        assert_eq!(handles[0].owner(), None);
    }

    #[test]
    fn test_reacquire_is_noop() {
        let rm = manager();
        let worker = WorkerId::new(1);
        rm.acquire_default(worker, &[CATALOG_ROOT_PAGE_ID]).unwrap();
        rm.acquire(worker, &[CATALOG_ROOT_PAGE_ID], 0, Duration::ZERO)
            .unwrap();
        assert_eq!(rm.held_pages(worker).len(), 1);
    }

    #[test]
    fn test_contended_page_is_denied_after_retries() {
        let rm = manager();
        let a = WorkerId::new(1);
        let b = WorkerId::new(2);
        rm.acquire_default(a, &[CATALOG_ROOT_PAGE_ID]).unwrap();

        let result = rm.acquire(b, &[CATALOG_ROOT_PAGE_ID], 2, Duration::from_millis(1));
        match result {
            Err(DbError::Denied { worker, attempts, .. }) => {
                assert_eq!(worker, b);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected denial, got {:?}", other.map(|h| h.len())),
        }
        assert_eq!(rm.waiting_workers(), 0);
    }

    #[test]
    fn test_allocate_exchange_delete() {
        let rm = manager();
        let worker = WorkerId::new(1);
        let handle = rm.allocate(worker).unwrap();
        let page_id = handle.page_id();
        assert_eq!(rm.owner_of(page_id), Some(worker));

        let typed = rm
            .exchange(worker, StringPage::new(page_id).into())
            .unwrap();
        assert!(typed.lock().as_attribute::<String>().is_ok());

        let other = WorkerId::new(2);
        assert!(matches!(
            rm.delete(other, &[page_id]),
            Err(DbError::NotOwner { .. })
        ));
        rm.delete(worker, &[page_id]).unwrap();
        assert!(rm.held_pages(worker).is_empty());
        assert_eq!(rm.memory().first_free_page().unwrap(), Some(page_id));
    }
}
