use std::fmt;

use crate::common::{
    DbError, PageId, PageType, Result, MIN_FRAGMENT_SIZE, PAGE_BODY_SIZE, PAGE_HEADER_SIZE,
    PAGE_SIZE,
};

use super::codec::{PageReader, PageWriter};

/// Slotted page layout (all integers big-endian):
///
/// +----------------------+
/// | type            i16  |  offset 0
/// | next page       i32  |  offset 2   (-1 = none)
/// | first free      i16  |  offset 6   (body offset, -1 = none)
/// | record size     i16  |  offset 8   (-1 = dynamic)
/// +----------------------+  offset 10 = body start
/// | body                 |
/// |  records and free    |
/// |  runs interleaved    |
/// +----------------------+
///
/// Each free run stores a node at its first body offset:
///   - next free offset: i16 (-1 terminates the list)
///   - run length: i16
const TYPE_OFFSET: usize = 0;
const NEXT_PAGE_OFFSET: usize = 2;
const FIRST_FREE_OFFSET: usize = 6;
const RECORD_SIZE_OFFSET: usize = 8;

/// A contiguous free byte range inside the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRun {
    pub offset: usize,
    pub len: usize,
}

/// Space handed out by `SlottedPage::allocate`. `len` may exceed the
/// requested size when the remaining tail was too small to stay free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: usize,
    pub len: usize,
}

/// A 4 KB page with a fixed header and an intrusive free-list allocator
/// over its body. Every typed page is a thin view over one of these.
pub struct SlottedPage {
    page_id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    is_dirty: bool,
}

impl SlottedPage {
    /// Creates a freshly formatted page.
    pub fn new(page_id: PageId, page_type: PageType, record_size: Option<usize>) -> Self {
        let mut page = Self {
            page_id,
            data: Box::new([0u8; PAGE_SIZE]),
            is_dirty: true,
        };
        page.reformat(page_type, record_size);
        page
    }

    /// Wraps bytes read from disk without touching them.
    pub fn from_bytes(page_id: PageId, data: Box<[u8; PAGE_SIZE]>) -> Self {
        Self {
            page_id,
            data,
            is_dirty: false,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    fn get_i16(&self, at: usize) -> i16 {
        i16::from_be_bytes([self.data[at], self.data[at + 1]])
    }

    fn put_i16(&mut self, at: usize, value: i16) {
        self.data[at..at + 2].copy_from_slice(&value.to_be_bytes());
        self.is_dirty = true;
    }

    /// Raw type code from the header.
    pub fn type_code(&self) -> i16 {
        self.get_i16(TYPE_OFFSET)
    }

    pub fn page_type(&self) -> Result<PageType> {
        PageType::from_code(self.type_code())
    }

    pub fn next_page(&self) -> Option<PageId> {
        let at = NEXT_PAGE_OFFSET;
        let raw = i32::from_be_bytes([
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ]);
        PageId::from_link(raw)
    }

    pub fn set_next_page(&mut self, page_id: Option<PageId>) {
        let raw = PageId::to_link(page_id).to_be_bytes();
        self.data[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4].copy_from_slice(&raw);
        self.is_dirty = true;
    }

    /// Head of the free list, `None` when the page is full.
    pub fn first_free(&self) -> Option<usize> {
        let raw = self.get_i16(FIRST_FREE_OFFSET);
        if raw < 0 {
            None
        } else {
            Some(raw as usize)
        }
    }

    pub(crate) fn set_first_free(&mut self, offset: Option<usize>) {
        let raw = offset.map(|o| o as i16).unwrap_or(-1);
        self.put_i16(FIRST_FREE_OFFSET, raw);
    }

    /// Fixed record size, or `None` for pages with variable-size records.
    pub fn record_size(&self) -> Option<usize> {
        let raw = self.get_i16(RECORD_SIZE_OFFSET);
        if raw < 0 {
            None
        } else {
            Some(raw as usize)
        }
    }

    /// Rebuilds the header and the whole free list from scratch.
    ///
    /// Fixed-size pages get one run per record, with the remainder of the
    /// body folded into the last run. Dynamic pages get a single run.
    ///
    /// A fixed record size must lie in `MIN_FRAGMENT_SIZE..=PAGE_BODY_SIZE`.
    /// `ObjectPage::new` checks the only size not fixed at compile time.
    pub fn reformat(&mut self, page_type: PageType, record_size: Option<usize>) {
        self.data.fill(0);
        self.put_i16(TYPE_OFFSET, page_type.code());
        self.set_next_page(None);
        self.put_i16(
            RECORD_SIZE_OFFSET,
            record_size.map(|s| s as i16).unwrap_or(-1),
        );

        let run_size = match record_size {
            Some(size) => {
                debug_assert!(
                    (MIN_FRAGMENT_SIZE..=PAGE_BODY_SIZE).contains(&size),
                    "record size {} cannot hold a free-list node",
                    size
                );
                size
            }
            None => PAGE_BODY_SIZE,
        };

        let count = PAGE_BODY_SIZE / run_size;
        for i in 0..count {
            let offset = i * run_size;
            let (next, len) = if i + 1 < count {
                ((offset + run_size) as i16, run_size)
            } else {
                (-1, PAGE_BODY_SIZE - offset)
            };
            self.write_node(offset, next, len);
        }
        self.set_first_free(Some(0));
    }

    fn write_node(&mut self, offset: usize, next: i16, len: usize) {
        let at = PAGE_HEADER_SIZE + offset;
        self.put_i16(at, next);
        self.put_i16(at + 2, len as i16);
    }

    fn read_node(&self, offset: usize) -> (i16, i16) {
        let at = PAGE_HEADER_SIZE + offset;
        (self.get_i16(at), self.get_i16(at + 2))
    }

    /// Places a read cursor on `offset` (relative to the body).
    pub fn reader(&self, offset: usize) -> Result<PageReader<'_>> {
        if offset + PAGE_HEADER_SIZE > PAGE_SIZE {
            return Err(DbError::CursorOutOfRange {
                offset,
                header: PAGE_HEADER_SIZE,
            });
        }
        Ok(PageReader::new(
            &self.data[PAGE_HEADER_SIZE + offset..],
            offset,
        ))
    }

    /// Places a write cursor on `offset` (relative to the body) and marks
    /// the page dirty.
    pub fn writer(&mut self, offset: usize) -> Result<PageWriter<'_>> {
        if offset + PAGE_HEADER_SIZE > PAGE_SIZE {
            return Err(DbError::CursorOutOfRange {
                offset,
                header: PAGE_HEADER_SIZE,
            });
        }
        self.is_dirty = true;
        Ok(PageWriter::new(
            &mut self.data[PAGE_HEADER_SIZE + offset..],
            offset,
        ))
    }

    /// Walks the free list in list order.
    pub fn free_runs(&self) -> Result<Vec<FreeRun>> {
        let mut runs = Vec::new();
        let mut cursor = self.first_free();
        let max_runs = PAGE_BODY_SIZE / MIN_FRAGMENT_SIZE + 1;

        while let Some(offset) = cursor {
            if offset + MIN_FRAGMENT_SIZE > PAGE_BODY_SIZE || runs.len() > max_runs {
                return Err(DbError::CorruptFreeList(self.page_id));
            }
            let (next, len) = self.read_node(offset);
            let len = len as usize;
            if len < MIN_FRAGMENT_SIZE || offset + len > PAGE_BODY_SIZE {
                return Err(DbError::CorruptFreeList(self.page_id));
            }
            runs.push(FreeRun { offset, len });
            cursor = if next < 0 { None } else { Some(next as usize) };
        }

        Ok(runs)
    }

    /// Total number of free body bytes.
    pub fn free_bytes(&self) -> Result<usize> {
        Ok(self.free_runs()?.iter().map(|r| r.len).sum())
    }

    /// First-fit allocation. Returns `None` when no run is large enough;
    /// a request is never partially satisfied.
    pub fn allocate(&mut self, size: usize) -> Result<Option<Extent>> {
        let size = size.max(MIN_FRAGMENT_SIZE);
        let runs = self.free_runs()?;

        for (i, run) in runs.iter().enumerate() {
            if run.len < size {
                continue;
            }

            let next = runs.get(i + 1).map(|r| r.offset as i16).unwrap_or(-1);
            let (replacement, len) = if run.len >= size + MIN_FRAGMENT_SIZE {
                let tail = run.offset + size;
                self.write_node(tail, next, run.len - size);
                (tail as i16, size)
            } else {
                (next, run.len)
            };

            if i == 0 {
                let head = if replacement < 0 {
                    None
                } else {
                    Some(replacement as usize)
                };
                self.set_first_free(head);
            } else {
                let prev = runs[i - 1];
                self.write_node(prev.offset, replacement, prev.len);
            }

            return Ok(Some(Extent {
                offset: run.offset,
                len,
            }));
        }

        Ok(None)
    }

    /// Pushes `len` bytes at `offset` back as the new head of the free
    /// list. Adjacent runs are not merged; see `coalesce`.
    pub fn release(&mut self, offset: usize, len: usize) -> Result<()> {
        if len < MIN_FRAGMENT_SIZE || offset + len > PAGE_BODY_SIZE {
            return Err(DbError::SlotOutOfRange {
                page: self.page_id,
                offset: offset as i16,
            });
        }
        // Releasing a run that is already free is a no-op.
        if self.free_runs()?.iter().any(|r| r.offset == offset) {
            return Ok(());
        }
        let head = self.first_free().map(|o| o as i16).unwrap_or(-1);
        self.write_node(offset, head, len);
        self.set_first_free(Some(offset));
        Ok(())
    }

    /// Merges physically adjacent free runs and relinks the list in
    /// ascending offset order. Returns the number of merges.
    pub fn coalesce(&mut self) -> Result<usize> {
        let mut runs = self.free_runs()?;
        runs.sort_by_key(|r| r.offset);

        let mut merged: Vec<FreeRun> = Vec::with_capacity(runs.len());
        let mut merges = 0;
        for run in runs {
            match merged.last_mut() {
                Some(last) if last.offset + last.len == run.offset => {
                    last.len += run.len;
                    merges += 1;
                }
                _ => merged.push(run),
            }
        }

        for (i, run) in merged.iter().enumerate() {
            let next = merged.get(i + 1).map(|r| r.offset as i16).unwrap_or(-1);
            self.write_node(run.offset, next, run.len);
        }
        self.set_first_free(merged.first().map(|r| r.offset));

        Ok(merges)
    }

    /// Number of record slots on a fixed-size page.
    pub fn slot_count(&self) -> usize {
        self.record_size()
            .map(|size| PAGE_BODY_SIZE / size)
            .unwrap_or(0)
    }

    /// Checks that `offset` is the start of a record slot.
    pub fn check_slot(&self, offset: i16) -> Result<usize> {
        let out_of_range = || DbError::SlotOutOfRange {
            page: self.page_id,
            offset,
        };
        let size = self.record_size().ok_or_else(out_of_range)?;
        if offset < 0 {
            return Err(out_of_range());
        }
        let offset = offset as usize;
        if offset % size != 0 || offset / size >= self.slot_count() {
            return Err(out_of_range());
        }
        Ok(offset)
    }

    /// Bytes owned by the slot at `offset`. The last slot also owns the
    /// body remainder when that remainder is too small to stay free.
    pub fn slot_len(&self, offset: usize) -> usize {
        let Some(size) = self.record_size() else {
            return 0;
        };
        let count = self.slot_count();
        let remainder = PAGE_BODY_SIZE - count * size;
        if remainder < MIN_FRAGMENT_SIZE && count > 0 && offset == (count - 1) * size {
            size + remainder
        } else {
            size
        }
    }

    /// Offsets of all occupied slots on a fixed-size page, ascending.
    pub fn used_slots(&self) -> Result<Vec<usize>> {
        let Some(size) = self.record_size() else {
            return Ok(Vec::new());
        };
        let mut free = vec![false; PAGE_BODY_SIZE];
        for run in self.free_runs()? {
            free[run.offset..run.offset + run.len].fill(true);
        }
        Ok((0..self.slot_count())
            .map(|i| i * size)
            .filter(|&offset| !free[offset])
            .collect())
    }

    /// Releases the slot at `offset` on a fixed-size page.
    pub fn release_slot(&mut self, offset: i16) -> Result<()> {
        let offset = self.check_slot(offset)?;
        let len = self.slot_len(offset);
        self.release(offset, len)
    }
}

impl fmt::Display for SlottedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_name = match self.page_type() {
            Ok(ty) => ty.to_string(),
            Err(_) => format!("unknown({})", self.type_code()),
        };
        writeln!(
            f,
            "page {} [{}] next={} first_free={} record_size={}",
            self.page_id.as_i32(),
            type_name,
            PageId::to_link(self.next_page()),
            self.first_free().map(|o| o as i64).unwrap_or(-1),
            self.record_size().map(|s| s as i64).unwrap_or(-1),
        )?;
        match self.free_runs() {
            Ok(runs) => {
                for run in runs {
                    writeln!(f, "  free @{} len {}", run.offset, run.len)?;
                }
                Ok(())
            }
            Err(err) => writeln!(f, "  {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_page(size: usize) -> SlottedPage {
        SlottedPage::new(PageId::new(3), PageType::String, Some(size))
    }

    #[test]
    fn test_slotted_page_init() {
        let page = fixed_page(70);

        assert_eq!(page.page_type().unwrap(), PageType::String);
        assert_eq!(page.next_page(), None);
        assert_eq!(page.first_free(), Some(0));
        assert_eq!(page.record_size(), Some(70));
        assert_eq!(page.slot_count(), 58);
        assert_eq!(page.free_bytes().unwrap(), PAGE_BODY_SIZE);

        let runs = page.free_runs().unwrap();
        assert_eq!(runs.len(), 58);
        // 4086 - 58 * 70 = 26 bytes folded into the last run
        assert_eq!(runs.last().unwrap().len, 96);
    }

    #[test]
    fn test_slotted_page_dynamic_init() {
        let page = SlottedPage::new(PageId::new(1), PageType::Catalog, None);
        assert_eq!(page.record_size(), None);
        assert_eq!(
            page.free_runs().unwrap(),
            vec![FreeRun {
                offset: 0,
                len: PAGE_BODY_SIZE
            }]
        );
    }

    #[test]
    fn test_slotted_page_allocate_splits_run() {
        let mut page = SlottedPage::new(PageId::new(1), PageType::Catalog, None);

        let first = page.allocate(100).unwrap().unwrap();
        assert_eq!(first, Extent { offset: 0, len: 100 });
        assert_eq!(page.first_free(), Some(100));

        let second = page.allocate(50).unwrap().unwrap();
        assert_eq!(second.offset, 100);
        assert_eq!(page.free_bytes().unwrap(), PAGE_BODY_SIZE - 150);
    }

    #[test]
    fn test_slotted_page_allocate_consumes_small_tail() {
        let mut page = SlottedPage::new(PageId::new(1), PageType::Catalog, None);

        let extent = page.allocate(PAGE_BODY_SIZE - 3).unwrap().unwrap();
        assert_eq!(extent.len, PAGE_BODY_SIZE);
        assert_eq!(page.first_free(), None);
        assert!(page.allocate(4).unwrap().is_none());
    }

    #[test]
    fn test_slotted_page_allocate_splices_middle_run() {
        let mut page = fixed_page(70);
        let a = page.allocate(70).unwrap().unwrap();
        let b = page.allocate(70).unwrap().unwrap();
        page.release(a.offset, a.len).unwrap();
        page.release(b.offset, b.len).unwrap();

        // List is now b -> a -> 140 -> ... ; a request too large for the
        // 70-byte runs must come from the 96-byte tail run, which is
        // consumed whole because the 3 leftover bytes cannot stay free.
        let tail = page.allocate(93).unwrap().unwrap();
        assert_eq!(tail.offset, 57 * 70);
        assert_eq!(tail.len, 96);

        let runs = page.free_runs().unwrap();
        assert_eq!(runs[0].offset, b.offset);
        assert_eq!(runs[1].offset, a.offset);
        assert!(runs.iter().all(|r| r.offset != tail.offset));
    }

    #[test]
    fn test_slotted_page_release_is_idempotent() {
        let mut page = fixed_page(70);
        let a = page.allocate(70).unwrap().unwrap();
        page.release(a.offset, a.len).unwrap();
        page.release(a.offset, a.len).unwrap();
        assert_eq!(page.free_bytes().unwrap(), PAGE_BODY_SIZE);
    }

    #[test]
    fn test_slotted_page_coalesce() {
        let mut page = SlottedPage::new(PageId::new(1), PageType::Catalog, None);
        let extents: Vec<_> = (0..4)
            .map(|_| page.allocate(100).unwrap().unwrap())
            .collect();
        for e in &extents {
            page.release(e.offset, e.len).unwrap();
        }
        assert_eq!(page.free_runs().unwrap().len(), 5);
        assert!(page.allocate(500).unwrap().unwrap().offset >= 400);

        let mut page = SlottedPage::new(PageId::new(1), PageType::Catalog, None);
        let extents: Vec<_> = (0..4)
            .map(|_| page.allocate(100).unwrap().unwrap())
            .collect();
        for e in &extents {
            page.release(e.offset, e.len).unwrap();
        }
        assert_eq!(page.coalesce().unwrap(), 4);
        assert_eq!(
            page.free_runs().unwrap(),
            vec![FreeRun {
                offset: 0,
                len: PAGE_BODY_SIZE
            }]
        );
    }

    #[test]
    fn test_slotted_page_used_slots() {
        let mut page = fixed_page(70);
        let a = page.allocate(70).unwrap().unwrap();
        let b = page.allocate(70).unwrap().unwrap();
        let c = page.allocate(70).unwrap().unwrap();
        page.release_slot(b.offset as i16).unwrap();

        assert_eq!(page.used_slots().unwrap(), vec![a.offset, c.offset]);
        assert!(page.check_slot(35).is_err());
        assert!(page.check_slot(-1).is_err());
        assert!(page.check_slot((58 * 70) as i16).is_err());
    }

    #[test]
    fn test_slot_len_includes_tiny_remainder() {
        // 4086 = 2 * 2042 + 2: the 2-byte remainder belongs to slot 1
        let mut page = fixed_page(2042);
        assert_eq!(page.slot_len(0), 2042);
        assert_eq!(page.slot_len(2042), 2044);

        let a = page.allocate(2042).unwrap().unwrap();
        let b = page.allocate(2042).unwrap().unwrap();
        assert_eq!(b.len, 2044);
        page.release_slot(a.offset as i16).unwrap();
        page.release_slot(b.offset as i16).unwrap();
        assert_eq!(page.free_bytes().unwrap(), PAGE_BODY_SIZE);
    }

    #[test]
    fn test_cursor_bounds() {
        let mut page = fixed_page(70);
        assert!(page.reader(PAGE_BODY_SIZE).is_ok());
        assert!(matches!(
            page.reader(PAGE_BODY_SIZE + 1),
            Err(DbError::CursorOutOfRange { .. })
        ));
        assert!(page.writer(PAGE_SIZE).is_err());
    }

    #[test]
    fn test_writes_mark_dirty() {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[1] = 2;
        let mut page = SlottedPage::from_bytes(PageId::new(7), data);
        assert!(!page.is_dirty());
        page.writer(0).unwrap().write_i16(5).unwrap();
        assert!(page.is_dirty());
        page.mark_clean();
        page.set_next_page(Some(PageId::new(9)));
        assert!(page.is_dirty());
        assert_eq!(page.next_page(), Some(PageId::new(9)));
    }

    #[test]
    fn test_corrupt_free_list_is_reported() {
        let mut page = fixed_page(70);
        page.set_first_free(Some(PAGE_BODY_SIZE - 2));
        assert!(matches!(
            page.free_runs(),
            Err(DbError::CorruptFreeList(_))
        ));
    }
}
