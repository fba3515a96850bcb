use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::{DbError, Result};

/// Page identifier - index of a 4 KB page inside the database file.
///
/// Stored on disk as a big-endian `i32`, where `-1` means "no page".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub i32);

impl PageId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn as_i32(&self) -> i32 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 >= 0
    }

    /// Byte offset of this page inside the backing file.
    pub fn file_offset(&self) -> u64 {
        self.0 as u64 * crate::common::PAGE_SIZE as u64
    }

    /// Decodes an on-disk link, mapping `-1` to `None`.
    pub fn from_link(raw: i32) -> Option<PageId> {
        if raw < 0 {
            None
        } else {
            Some(PageId(raw))
        }
    }

    /// Encodes an optional link for the on-disk `-1 = none` convention.
    pub fn to_link(page_id: Option<PageId>) -> i32 {
        page_id.map(|p| p.0).unwrap_or(INVALID_PAGE_ID.0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Sentinel used on disk for "no page".
pub const INVALID_PAGE_ID: PageId = PageId(-1);

/// Page 0 always holds the file header.
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Page 1 always holds the root of the catalog chain.
pub const CATALOG_ROOT_PAGE_ID: PageId = PageId(1);

/// Address of a record inside a page: page index plus body offset.
///
/// Addresses are the only cross-page references. `Address::NULL` marks a
/// missing (null) attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pub page_id: PageId,
    pub offset: i16,
}

impl Address {
    pub const NULL: Address = Address {
        page_id: INVALID_PAGE_ID,
        offset: -1,
    };

    pub fn new(page_id: PageId, offset: i16) -> Self {
        Self { page_id, offset }
    }

    pub fn is_null(&self) -> bool {
        self.page_id == INVALID_PAGE_ID && self.offset == -1
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "(null)")
        } else {
            write!(f, "({}, {})", self.page_id.0, self.offset)
        }
    }
}

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a logical worker (one per client operation).
///
/// The resource manager keys its ownership and wait-for graph by this id;
/// only identity and equality matter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub u64);

impl WorkerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Hands out a process-unique worker id.
    pub fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Page type tag stored in the first two bytes of every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    Catalog,
    Object,
    String,
    Integer,
    Boolean,
    Free,
    Header,
}

impl PageType {
    pub fn code(&self) -> i16 {
        match self {
            PageType::Catalog => 0,
            PageType::Object => 1,
            PageType::String => 2,
            PageType::Integer => 3,
            PageType::Boolean => 4,
            PageType::Free => 99,
            PageType::Header => 100,
        }
    }

    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            0 => Ok(PageType::Catalog),
            1 => Ok(PageType::Object),
            2 => Ok(PageType::String),
            3 => Ok(PageType::Integer),
            4 => Ok(PageType::Boolean),
            99 => Ok(PageType::Free),
            100 => Ok(PageType::Header),
            other => Err(DbError::UnknownPageType(other)),
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageType::Catalog => "catalog",
            PageType::Object => "object",
            PageType::String => "string",
            PageType::Integer => "integer",
            PageType::Boolean => "boolean",
            PageType::Free => "free",
            PageType::Header => "header",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_links() {
        assert_eq!(PageId::from_link(-1), None);
        assert_eq!(PageId::from_link(7), Some(PageId::new(7)));
        assert_eq!(PageId::to_link(None), -1);
        assert_eq!(PageId::to_link(Some(PageId::new(3))), 3);
        assert_eq!(PageId::new(2).file_offset(), 8192);
    }

    #[test]
    fn test_address_null() {
        assert!(Address::NULL.is_null());
        assert!(!Address::new(PageId::new(4), 0).is_null());
        assert_eq!(Address::NULL.to_string(), "(null)");
        assert_eq!(Address::new(PageId::new(4), 70).to_string(), "(4, 70)");
    }

    #[test]
    fn test_worker_ids_are_unique() {
        let a = WorkerId::next();
        let b = WorkerId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_page_type_codes() {
        for ty in [
            PageType::Catalog,
            PageType::Object,
            PageType::String,
            PageType::Integer,
            PageType::Boolean,
            PageType::Free,
            PageType::Header,
        ] {
            assert_eq!(PageType::from_code(ty.code()).unwrap(), ty);
        }
        assert!(matches!(
            PageType::from_code(42),
            Err(DbError::UnknownPageType(42))
        ));
    }
}
