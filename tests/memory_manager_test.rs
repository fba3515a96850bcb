//! Integration tests for the memory manager

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use slotdb::buffer::MemoryManager;
use slotdb::common::{Address, DbError, PageId, WorkerId, PAGE_SIZE};
use slotdb::storage::disk::{DiskManager, DiskScheduler, MemoryStore};
use slotdb::storage::page::IntegerPage;
use tempfile::NamedTempFile;

fn open_file(path: &std::path::Path, capacity: usize) -> MemoryManager {
    let dm = Arc::new(DiskManager::new(path).unwrap());
    MemoryManager::open(dm, capacity).unwrap()
}

/// Allocates an integer page holding `value` in its first slot.
fn integer_page(mm: &MemoryManager, value: i64) -> PageId {
    let placeholder = mm.allocate_page(None).unwrap();
    let page_id = placeholder.page_id();
    drop(placeholder);

    let frame = mm
        .exchange_page(IntegerPage::new(page_id).into(), None)
        .unwrap();
    let mut page = frame.lock();
    page.as_attribute_mut::<i64>()
        .unwrap()
        .insert(&value, Address::NULL)
        .unwrap()
        .unwrap();
    page_id
}

fn first_value(mm: &MemoryManager, page_id: PageId) -> i64 {
    let frame = mm.load_page(page_id).unwrap();
    let page = frame.lock();
    page.as_attribute::<i64>().unwrap().value(0).unwrap()
}

#[test]
fn test_memory_manager_formats_new_file() {
    let temp_file = NamedTempFile::new().unwrap();
    let mm = open_file(temp_file.path(), 8);
    assert_eq!(mm.total_pages().unwrap(), 2);
    drop(mm);

    assert_eq!(
        std::fs::metadata(temp_file.path()).unwrap().len(),
        2 * PAGE_SIZE as u64
    );
    let header = std::fs::read(temp_file.path()).unwrap();
    assert_eq!(&header[10..21], b"PROJECTDATA");
}

#[test]
fn test_memory_manager_eviction_writes_back() {
    let temp_file = NamedTempFile::new().unwrap();
    let mm = open_file(temp_file.path(), 4);

    let pages: Vec<PageId> = (0..10).map(|i| integer_page(&mm, i * 100)).collect();
    assert!(mm.cached_pages().len() <= 4);

    for (i, page_id) in pages.iter().enumerate() {
        assert_eq!(first_value(&mm, *page_id), i as i64 * 100);
    }
}

#[test]
fn test_memory_manager_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let pages: Vec<PageId> = {
        let mm = open_file(temp_file.path(), 16);
        (0..3).map(|i| integer_page(&mm, 7 + i)).collect()
    };

    let mm = open_file(temp_file.path(), 16);
    assert_eq!(mm.total_pages().unwrap(), 5);
    for (i, page_id) in pages.iter().enumerate() {
        assert_eq!(first_value(&mm, *page_id), 7 + i as i64);
    }
}

#[test]
fn test_memory_manager_free_chain_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    {
        let mm = open_file(temp_file.path(), 16);
        let a = integer_page(&mm, 1);
        let b = integer_page(&mm, 2);
        mm.delete_page(a).unwrap();
        mm.delete_page(b).unwrap();
        assert_eq!(mm.first_free_page().unwrap(), Some(b));
    }

    let mm = open_file(temp_file.path(), 16);
    assert_eq!(mm.first_free_page().unwrap(), Some(PageId::new(3)));
    assert!(matches!(
        mm.load_page(PageId::new(2)),
        Err(DbError::FreePageAccess(_))
    ));

    // Freed pages come back in LIFO order without growing the file
    assert_eq!(mm.allocate_page(None).unwrap().page_id(), PageId::new(3));
    assert_eq!(mm.allocate_page(None).unwrap().page_id(), PageId::new(2));
    assert_eq!(mm.total_pages().unwrap(), 4);
}

#[test]
fn test_memory_manager_owned_pages_stay_cached() {
    let mm = MemoryManager::open(Arc::new(MemoryStore::new()), 3).unwrap();
    let worker = WorkerId::new(1);
    let owned = mm.allocate_page(Some(worker)).unwrap().page_id();

    for i in 0..6 {
        integer_page(&mm, i);
    }
    assert!(mm.is_cached(owned));
}

#[test]
fn test_memory_manager_rejects_foreign_file() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), vec![0u8; 2 * PAGE_SIZE]).unwrap();

    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    assert!(matches!(
        MemoryManager::open(dm, 8),
        Err(DbError::InvalidDatabaseFile(_))
    ));
}

#[test]
fn test_memory_manager_over_disk_scheduler() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let scheduler = Arc::new(DiskScheduler::new(dm));
    let mm = MemoryManager::open(scheduler, 2).unwrap();

    let pages: Vec<PageId> = (0..4).map(|i| integer_page(&mm, -i)).collect();
    for (i, page_id) in pages.iter().enumerate() {
        assert_eq!(first_value(&mm, *page_id), -(i as i64));
    }
}

#[test]
fn test_memory_manager_concurrent_allocation() {
    let mm = Arc::new(MemoryManager::open(Arc::new(MemoryStore::new()), 64).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let mm = Arc::clone(&mm);
            thread::spawn(move || {
                (0..10)
                    .map(|i| integer_page(&mm, i))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for page_id in handle.join().unwrap() {
            assert!(seen.insert(page_id), "page {} handed out twice", page_id);
        }
    }
    assert_eq!(seen.len(), 40);
    assert_eq!(mm.total_pages().unwrap(), 42);
}
