use thiserror::Error;

use super::types::{PageId, PageType, WorkerId};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Invalid database file: {0}")]
    InvalidDatabaseFile(String),

    // Allocation
    #[error("Database file cannot grow past {0} pages")]
    FileExhausted(i32),

    // Contention
    #[error("{worker} denied pages {pages:?} after {attempts} attempts")]
    Denied {
        worker: WorkerId,
        pages: Vec<PageId>,
        attempts: u32,
    },

    #[error("{worker} was interrupted while waiting for pages")]
    Interrupted { worker: WorkerId },

    #[error("{worker} does not own page {page}")]
    NotOwner { worker: WorkerId, page: PageId },

    // Schema
    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Table {table} has no attribute {attribute}")]
    UnknownAttribute { table: String, attribute: String },

    #[error("Table {table} declares attribute {attribute} twice")]
    DuplicateAttribute { table: String, attribute: String },

    #[error("Table {0} must declare at least one attribute")]
    EmptySchema(String),

    #[error("Attribute {attribute} of {table} expects {expected}, got {found}")]
    TypeMismatch {
        table: String,
        attribute: String,
        expected: PageType,
        found: String,
    },

    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Unknown attribute type: {0}")]
    UnknownAttributeType(String),

    #[error("Operator {operator} is not supported on {page_type} attribute {attribute}")]
    UnsupportedOperator {
        attribute: String,
        operator: String,
        page_type: PageType,
    },

    #[error("Name {name:?} is {len} bytes, limit is {max}")]
    NameTooLong { name: String, len: usize, max: usize },

    #[error("Value is {len} bytes, limit is {max}")]
    ValueTooLong { len: usize, max: usize },

    #[error("Record of {size} bytes exceeds page capacity of {capacity} bytes")]
    RecordTooLarge { size: usize, capacity: usize },

    // Corruption / invariant violations
    #[error("Cursor {offset} + header {header} is outside the page")]
    CursorOutOfRange { offset: usize, header: usize },

    #[error("Unknown page type code {0}")]
    UnknownPageType(i16),

    #[error("Page {page} is a {found} page, expected {expected}")]
    UnexpectedPageType {
        page: PageId,
        expected: PageType,
        found: PageType,
    },

    #[error("Free list of page {0} is corrupt")]
    CorruptFreeList(PageId),

    #[error("Record at offset {offset} on page {page} is corrupt")]
    CorruptRecord { page: PageId, offset: usize },

    #[error("Page {0} is reserved and cannot be freed")]
    ReservedPage(PageId),

    #[error("Page {0} is free and was not allocated")]
    FreePageAccess(PageId),

    #[error("Page {page} is outside the file of {total} pages")]
    PageOutOfBounds { page: PageId, total: i32 },

    #[error("Offset {offset} on page {page} is not a record slot")]
    SlotOutOfRange { page: PageId, offset: i16 },

    #[error("Page {0} is not resident in the page cache")]
    PageNotCached(PageId),
}

impl DbError {
    /// Contention failures can be retried by the caller once other workers
    /// have released their pages.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Denied { .. })
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_only_for_denials() {
        let denied = DbError::Denied {
            worker: WorkerId::new(1),
            pages: vec![PageId::new(1), PageId::new(4)],
            attempts: 3,
        };
        assert!(denied.is_retryable());
        assert!(!DbError::TableNotFound("users".into()).is_retryable());
        assert!(!DbError::Interrupted {
            worker: WorkerId::new(2)
        }
        .is_retryable());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = DbError::UnknownAttribute {
            table: "users".into(),
            attribute: "email".into(),
        };
        assert_eq!(err.to_string(), "Table users has no attribute email");
    }
}
