//! slotdb - a single-file, page-based storage engine
//!
//! Tables are stored column-wise on fixed-size 4 KB pages inside one
//! database file. Each table has an object page chain holding one row of
//! addresses per object, and one value page chain per attribute. Every
//! stored value carries a back-link to the row that owns it.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Storage Layer** (`storage`): Disk I/O and page layout
//!   - `DiskManager`: Reads and writes pages of the database file
//!   - `DiskScheduler`: Background I/O worker fed through a channel
//!   - `SlottedPage`: Page header plus an intrusive free-list allocator
//!   - Typed pages (`HeaderPage`, `CatalogPage`, `ObjectPage`,
//!     `StringPage`, `IntegerPage`, `BooleanPage`, `FreePage`) unified in
//!     the `Page` enum
//!
//! - **Memory Manager** (`buffer`): Page cache with LFU eviction, dirty
//!   tracking and whole-page allocation through the header page
//!
//! - **Concurrency** (`concurrency`): `ResourceManager` hands pages to
//!   workers in ascending order, checks a wait-for graph for cycles and
//!   retries contended requests with a bounded wait
//!
//! - **Catalog** (`catalog`): Table schemas and catalog records
//!
//! - **Tables** (`table`): `TableManager` with create, insert, search,
//!   update and delete
//!
//! # Example
//!
//! ```rust,no_run
//! use slotdb::catalog::TableSchema;
//! use slotdb::common::Operator;
//! use slotdb::table::{Condition, Row};
//! use slotdb::Database;
//!
//! let db = Database::open("people.db").unwrap();
//! db.create_table(
//!     &TableSchema::builder("people")
//!         .string("name")
//!         .integer("age")
//!         .build(),
//! )
//! .unwrap();
//!
//! db.add_object("people", &Row::new().with("name", "Ada").with("age", 36))
//!     .unwrap();
//!
//! let adults = db
//!     .search_object("people", &[Condition::new("age", Operator::Ge, 18)])
//!     .unwrap();
//! assert_eq!(adults.len(), 1);
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
pub mod db;
pub mod storage;
pub mod table;

// Re-export commonly used types at the crate root
pub use common::{Address, DbError, PageId, Result, WorkerId};
pub use db::Database;
