use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{DbError, PageId, Result, PAGE_SIZE};

use super::PageStore;

/// DiskManager reads and writes whole pages of a single database file.
/// The file only ever grows by appending zeroed pages.
pub struct DiskManager {
    /// The database file
    db_file: Mutex<File>,
    /// Path to the database file
    db_path: String,
    /// Number of pages physically present in the file
    num_pages: AtomicI32,
    /// Number of disk reads performed
    num_reads: AtomicU32,
    /// Number of disk writes performed
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the database file at `db_path`, creating it if it doesn't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(DbError::InvalidDatabaseFile(format!(
                "{} is {} bytes, not a multiple of the page size",
                path_str, file_size
            )));
        }
        let num_pages = (file_size / PAGE_SIZE as u64) as i32;
        debug!(path = %path_str, pages = num_pages, "opened database file");

        Ok(Self {
            db_file: Mutex::new(file),
            db_path: path_str,
            num_pages: AtomicI32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    fn check_bounds(&self, page_id: PageId) -> Result<()> {
        let total = self.num_pages.load(Ordering::Acquire);
        if !page_id.is_valid() || page_id.as_i32() >= total {
            return Err(DbError::PageOutOfBounds {
                page: page_id,
                total,
            });
        }
        Ok(())
    }

    /// Reads a page from disk into the provided buffer.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8; PAGE_SIZE]) -> Result<()> {
        self.check_bounds(page_id)?;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id.file_offset()))?;
        file.read_exact(data)?;

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        self.check_bounds(page_id)?;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(page_id.file_offset()))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Appends zeroed pages until the file holds `total_pages` pages.
    pub fn expand(&self, total_pages: i32) -> Result<()> {
        let file = self.db_file.lock();
        let current = self.num_pages.load(Ordering::Acquire);
        if total_pages <= current {
            return Ok(());
        }
        file.set_len(total_pages as u64 * PAGE_SIZE as u64)?;
        self.num_pages.store(total_pages, Ordering::Release);
        debug!(from = current, to = total_pages, "grew database file");
        Ok(())
    }

    /// Returns the number of pages in the file.
    pub fn get_num_pages(&self) -> i32 {
        self.num_pages.load(Ordering::Acquire)
    }

    /// Returns the number of disk reads performed.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of disk writes performed.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns the path to the database file.
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }

    /// Flushes any buffered writes to disk.
    pub fn sync_file(&self) -> Result<()> {
        let file = self.db_file.lock();
        file.sync_all()?;
        Ok(())
    }
}

impl PageStore for DiskManager {
    fn load(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        self.read_page(page_id, &mut data)?;
        Ok(data)
    }

    fn save(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        self.write_page(page_id, data)
    }

    fn expand_file_if_needed(&self, total_pages: i32) -> Result<()> {
        self.expand(total_pages)
    }

    fn page_count(&self) -> Result<i32> {
        Ok(self.get_num_pages())
    }

    fn sync(&self) -> Result<()> {
        self.sync_file()
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        // Ensure all data is flushed to disk
        let file = self.db_file.get_mut();
        let _ = file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_manager_new() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();
        assert_eq!(dm.get_num_pages(), 0);
    }

    #[test]
    fn test_disk_manager_expand() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        dm.expand(3).unwrap();
        assert_eq!(dm.get_num_pages(), 3);
        dm.expand(2).unwrap();
        assert_eq!(dm.get_num_pages(), 3);
        assert_eq!(
            temp_file.path().metadata().unwrap().len(),
            3 * PAGE_SIZE as u64
        );
    }

    #[test]
    fn test_disk_manager_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();
        dm.expand(1).unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(PageId::new(0), &write_data).unwrap();

        let read_data = dm.load(PageId::new(0)).unwrap();
        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
        assert_eq!(dm.get_num_reads(), 1);
        assert_eq!(dm.get_num_writes(), 1);
    }

    #[test]
    fn test_disk_manager_out_of_bounds() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();
        dm.expand(1).unwrap();

        assert!(matches!(
            dm.load(PageId::new(1)),
            Err(DbError::PageOutOfBounds { total: 1, .. })
        ));
        assert!(dm.save(PageId::new(-1), &[0u8; PAGE_SIZE]).is_err());
    }

    #[test]
    fn test_disk_manager_rejects_torn_file() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), [0u8; 100]).unwrap();
        assert!(matches!(
            DiskManager::new(temp_file.path()),
            Err(DbError::InvalidDatabaseFile(_))
        ));
    }
}
