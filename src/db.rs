use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::buffer::MemoryManager;
use crate::catalog::{AttributeType, TableDescription, TableSchema};
use crate::common::{Address, EngineConfig, Result};
use crate::concurrency::ResourceManager;
use crate::storage::disk::{DiskManager, DiskScheduler, MemoryStore, PageStore};
use crate::table::{Condition, Row, TableManager, TableStats};

/// A database file opened with its full stack: disk worker, page cache,
/// resource manager and table manager.
///
/// `Database` is `Sync`; share it between threads behind an `Arc`. Each
/// call runs as an independent worker.
pub struct Database {
    tables: TableManager,
}

impl Database {
    /// Opens `path` with the default configuration, creating and formatting
    /// the file if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, EngineConfig::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        let disk = Arc::new(DiskManager::new(path.as_ref())?);
        info!(path = %path.as_ref().display(), pages = disk.get_num_pages(), "opening database");
        let scheduler = Arc::new(DiskScheduler::new(disk));
        Self::with_store(scheduler, config)
    }

    /// A database that lives in memory only.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    pub fn with_store(store: Arc<dyn PageStore>, config: EngineConfig) -> Result<Self> {
        let memory = Arc::new(MemoryManager::open(store, config.cache_capacity)?);
        let resources = Arc::new(ResourceManager::new(memory, &config));
        Ok(Self {
            tables: TableManager::new(resources),
        })
    }

    pub fn tables(&self) -> &TableManager {
        &self.tables
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        self.tables.resources()
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        self.tables.resources().memory()
    }

    pub fn create_table(&self, schema: &TableSchema) -> Result<TableDescription> {
        self.tables.create_table(schema)
    }

    pub fn delete_table(&self, name: &str) -> Result<()> {
        self.tables.delete_table(name)
    }

    pub fn add_attribute(
        &self,
        table: &str,
        name: &str,
        attribute_type: AttributeType,
    ) -> Result<TableDescription> {
        self.tables.add_attribute(table, name, attribute_type)
    }

    pub fn describe_table(&self, name: &str) -> Result<TableDescription> {
        self.tables.describe_table(name)
    }

    pub fn table_schema(&self, name: &str) -> Result<TableSchema> {
        self.tables.table_schema(name)
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.tables.list_tables()
    }

    pub fn add_object(&self, table: &str, values: &Row) -> Result<Address> {
        self.tables.add_object(table, values)
    }

    pub fn search_object(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Row>> {
        self.tables.search_object(table, conditions)
    }

    pub fn update_object(&self, table: &str, conditions: &[Condition], values: &Row) -> Result<usize> {
        self.tables.update_object(table, conditions, values)
    }

    pub fn delete_object(&self, table: &str, conditions: &[Condition]) -> Result<usize> {
        self.tables.delete_object(table, conditions)
    }

    pub fn compact_table(&self, name: &str) -> Result<usize> {
        self.tables.compact_table(name)
    }

    pub fn table_stats(&self, name: &str) -> Result<TableStats> {
        self.tables.table_stats(name)
    }

    /// Writes every dirty page back and syncs the file.
    pub fn flush(&self) -> Result<()> {
        self.memory().flush_all()
    }
}
