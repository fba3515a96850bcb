use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::trace;

use crate::common::{DbError, PageId, Result, PAGE_SIZE};

use super::PageStore;

/// A disk I/O request. Each request owns its buffer and carries the
/// channel its result is sent back on.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        reply: Sender<Result<Box<[u8; PAGE_SIZE]>>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        reply: Sender<Result<()>>,
    },
    Expand {
        total_pages: i32,
        reply: Sender<Result<()>>,
    },
    Sync {
        reply: Sender<Result<()>>,
    },
}

/// DiskScheduler manages a background worker thread that serializes all
/// file I/O through a request queue. It is itself a `PageStore`, so the
/// memory manager can sit on top of it unchanged.
pub struct DiskScheduler {
    /// The store that performs the actual I/O
    store: Arc<dyn PageStore>,
    /// Channel sender for queuing requests
    request_sender: Sender<DiskRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawns a background worker thread in front of `store`.
    pub fn new(store: Arc<dyn PageStore>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let store_clone = Arc::clone(&store);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(store_clone, receiver, shutdown_clone);
        });

        Self {
            store,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Schedules a disk request for processing by the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| DbError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    fn round_trip<T>(&self, build: impl FnOnce(Sender<Result<T>>) -> DiskRequest) -> Result<T> {
        let (tx, rx) = bounded(1);
        self.schedule(build(tx))?;
        rx.recv().map_err(|e| {
            DbError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// The background worker thread function.
    /// Processes requests from the queue until shutdown is signaled.
    fn start_worker_thread(
        store: Arc<dyn PageStore>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                // Drain remaining requests before exiting
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(store.as_ref(), request);
                }
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(request) => Self::process_request(store.as_ref(), request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn process_request(store: &dyn PageStore, request: DiskRequest) {
        // A dropped reply receiver means the caller gave up; nothing to do.
        match request {
            DiskRequest::Read { page_id, reply } => {
                trace!(page = page_id.as_i32(), "disk read");
                let _ = reply.send(store.load(page_id));
            }
            DiskRequest::Write {
                page_id,
                data,
                reply,
            } => {
                trace!(page = page_id.as_i32(), "disk write");
                let _ = reply.send(store.save(page_id, &data));
            }
            DiskRequest::Expand { total_pages, reply } => {
                let _ = reply.send(store.expand_file_if_needed(total_pages));
            }
            DiskRequest::Sync { reply } => {
                let _ = reply.send(store.sync());
            }
        }
    }

    /// Returns the store behind the worker.
    pub fn store(&self) -> &Arc<dyn PageStore> {
        &self.store
    }
}

impl PageStore for DiskScheduler {
    fn load(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        self.round_trip(|reply| DiskRequest::Read { page_id, reply })
    }

    fn save(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let data = Box::new(*data);
        self.round_trip(|reply| DiskRequest::Write {
            page_id,
            data,
            reply,
        })
    }

    fn expand_file_if_needed(&self, total_pages: i32) -> Result<()> {
        self.round_trip(|reply| DiskRequest::Expand { total_pages, reply })
    }

    fn page_count(&self) -> Result<i32> {
        self.store.page_count()
    }

    fn sync(&self) -> Result<()> {
        self.round_trip(|reply| DiskRequest::Sync { reply })
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::disk::{DiskManager, MemoryStore};
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        scheduler.expand_file_if_needed(1).unwrap();
        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler.save(PageId::new(0), &write_data).unwrap();

        let read_data = scheduler.load(PageId::new(0)).unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
        scheduler.sync().unwrap();
    }

    #[test]
    fn test_disk_scheduler_propagates_errors() {
        let scheduler = DiskScheduler::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            scheduler.load(PageId::new(3)),
            Err(DbError::PageOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_disk_scheduler_concurrent_callers() {
        let scheduler = Arc::new(DiskScheduler::new(Arc::new(MemoryStore::new())));
        scheduler.expand_file_if_needed(8).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let scheduler = Arc::clone(&scheduler);
                thread::spawn(move || {
                    let data = [i as u8; PAGE_SIZE];
                    scheduler.save(PageId::new(i), &data).unwrap();
                    assert_eq!(scheduler.load(PageId::new(i)).unwrap()[17], i as u8);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(scheduler.page_count().unwrap(), 8);
    }
}
