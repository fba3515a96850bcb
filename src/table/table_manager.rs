use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::buffer::PageHandle;
use crate::catalog::{
    AttributeDefinition, AttributeDescription, AttributeType, TableDescription, TableSchema,
};
use crate::common::{
    Address, DbError, PageId, Result, WorkerId, CATALOG_ROOT_PAGE_ID, INVALID_PAGE_ID,
    PAGE_BODY_SIZE, STRING_SIZE,
};
use crate::concurrency::ResourceManager;
use crate::storage::page::{
    check_name, AttributePage, AttributeVariant, BooleanPage, CatalogPage, IntegerPage,
    ObjectPage, Page, StringPage,
};

use super::{Condition, Row, Value};

/// Pages held by one logical table operation.
///
/// A zone acquires pages one at a time as the operation discovers them;
/// `TableManager::run` releases everything once the operation ends.
struct Zone<'a> {
    resources: &'a ResourceManager,
    worker: WorkerId,
    /// `(tail, fresh)` links made by `chain_new_page`, oldest first
    chained: RefCell<Vec<(PageId, PageId)>>,
}

impl Zone<'_> {
    fn page(&self, page_id: PageId) -> Result<PageHandle> {
        let mut handles = if self.resources.held_pages(self.worker).is_empty() {
            self.resources.acquire_default(self.worker, &[page_id])?
        } else {
            self.resources.expand(self.worker, &[page_id])?
        };
        handles.pop().ok_or(DbError::PageNotCached(page_id))
    }

    /// Allocates a page and installs the page built for its id. The page
    /// goes back to the free chain if it cannot be built.
    fn allocate(&self, build: impl FnOnce(PageId) -> Result<Page>) -> Result<PageHandle> {
        let placeholder = self.resources.allocate(self.worker)?;
        let page_id = placeholder.page_id();
        drop(placeholder);
        match build(page_id) {
            Ok(page) => self.resources.exchange(self.worker, page),
            Err(err) => {
                self.delete(&[page_id])?;
                Err(err)
            }
        }
    }

    fn chain_mark(&self) -> usize {
        self.chained.borrow().len()
    }

    fn delete(&self, pages: &[PageId]) -> Result<()> {
        self.resources.delete(self.worker, pages)
    }
}

/// Where a table lives in the catalog chain.
struct CatalogEntry {
    page_id: PageId,
    offset: i16,
    table: TableDescription,
}

/// A catalog entry plus the attribute types read from the root pages.
struct TableInfo {
    entry: CatalogEntry,
    types: Vec<AttributeType>,
}

impl TableInfo {
    fn name(&self) -> &str {
        self.entry.table.name()
    }

    fn index_of(&self, attribute: &str) -> Result<usize> {
        self.entry
            .table
            .attribute_index(attribute)
            .ok_or_else(|| DbError::UnknownAttribute {
                table: self.name().to_string(),
                attribute: attribute.to_string(),
            })
    }

    fn check_values(&self, values: &Row) -> Result<()> {
        for (name, value) in values.iter() {
            let index = self.index_of(name)?;
            let expected = self.types[index];
            if !value.fits(expected) {
                return Err(DbError::TypeMismatch {
                    table: self.name().to_string(),
                    attribute: name.to_string(),
                    expected: expected.page_type(),
                    found: value.type_name().to_string(),
                });
            }
        }
        Ok(())
    }

    fn check_condition(&self, condition: &Condition) -> Result<usize> {
        let index = self.index_of(&condition.attribute)?;
        condition.check(self.name(), self.types[index])?;
        Ok(index)
    }
}

/// Space accounting for the pages of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    /// Object and attribute pages reachable from the catalog entry
    pub pages: usize,
    /// Free bytes summed over those pages
    pub free_bytes: usize,
    /// Occupied object rows
    pub rows: usize,
}

/// Table-level operations on top of the resource manager: catalog lookup,
/// table creation and removal, object insertion, conditional search,
/// update and delete.
///
/// Every public operation runs as its own worker and releases all pages it
/// acquired before returning, on success and on failure.
pub struct TableManager {
    resources: Arc<ResourceManager>,
}

impl TableManager {
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    fn run<T>(&self, operation: impl FnOnce(&Zone<'_>) -> Result<T>) -> Result<T> {
        let zone = Zone {
            resources: &self.resources,
            worker: WorkerId::next(),
            chained: RefCell::new(Vec::new()),
        };
        let result = operation(&zone);
        let released = self.resources.release_all(zone.worker);
        let value = result?;
        released?;
        Ok(value)
    }

    // Catalog

    /// Creates the table's object page and one value page per attribute,
    /// then records it in the catalog. Pages allocated before a failure are
    /// returned to the free chain.
    pub fn create_table(&self, schema: &TableSchema) -> Result<TableDescription> {
        schema.validate()?;
        self.run(|zone| {
            if Self::find_table(zone, schema.name())?.is_some() {
                return Err(DbError::TableExists(schema.name().to_string()));
            }

            let mark = zone.chain_mark();
            let mut created = Vec::new();
            match Self::build_table(zone, schema, &mut created) {
                Ok(table) => {
                    info!(table = table.name(), attributes = table.attribute_count(), "created table");
                    Ok(table)
                }
                Err(err) => {
                    warn!(table = schema.name(), pages = created.len(), error = %err, "rolling back table creation");
                    let rollback =
                        Self::unchain_since(zone, mark).and_then(|_| zone.delete(&created));
                    if let Err(rollback) = rollback {
                        warn!(table = schema.name(), error = %rollback, "rollback left pages allocated");
                    }
                    Err(err)
                }
            }
        })
    }

    fn build_table(
        zone: &Zone<'_>,
        schema: &TableSchema,
        created: &mut Vec<PageId>,
    ) -> Result<TableDescription> {
        let count = schema.attribute_count();
        let object_page = zone
            .allocate(|id| ObjectPage::new(id, count).map(Page::from))?
            .page_id();
        created.push(object_page);

        let mut attributes = Vec::with_capacity(count);
        for definition in schema.attributes() {
            let attribute_type = definition.attribute_type();
            let page_id = zone
                .allocate(|id| Ok(Self::attribute_page(attribute_type, id)))?
                .page_id();
            created.push(page_id);
            attributes.push(AttributeDescription::new(definition.name(), page_id));
        }

        let table = TableDescription::new(schema.name(), object_page, attributes);
        Self::insert_catalog(zone, &table)?;
        Ok(table)
    }

    fn attribute_page(attribute_type: AttributeType, page_id: PageId) -> Page {
        match attribute_type {
            AttributeType::String => StringPage::new(page_id).into(),
            AttributeType::Integer => IntegerPage::new(page_id).into(),
            AttributeType::Boolean => BooleanPage::new(page_id).into(),
        }
    }

    /// Frees every page of the table and its catalog record.
    pub fn delete_table(&self, name: &str) -> Result<()> {
        self.run(|zone| {
            let entry = Self::find_table(zone, name)?
                .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

            let mut pages = Vec::new();
            for root in entry.table.root_pages() {
                pages.extend(Self::chain(zone, root)?);
            }

            Self::remove_catalog(zone, &entry)?;
            zone.delete(&pages)?;
            info!(table = name, pages = pages.len(), "deleted table");
            Ok(())
        })
    }

    /// Appends an attribute to an existing table.
    ///
    /// Rows are wider afterwards, so the object chain is rebuilt: every row
    /// moves to a new object page, the back-links of its values are
    /// re-pointed and the old object pages are freed. The catalog record is
    /// rewritten with the new object root.
    pub fn add_attribute(
        &self,
        table: &str,
        name: &str,
        attribute_type: AttributeType,
    ) -> Result<TableDescription> {
        check_name(name, STRING_SIZE)?;
        self.run(|zone| {
            let info = Self::require_table(zone, table)?;
            if info.entry.table.attribute_index(name).is_some() {
                return Err(DbError::DuplicateAttribute {
                    table: table.to_string(),
                    attribute: name.to_string(),
                });
            }
            let mut widened = info.entry.table.clone();
            widened.push_attribute(AttributeDescription::new(name, INVALID_PAGE_ID));
            if widened.record_size() > PAGE_BODY_SIZE {
                return Err(DbError::RecordTooLarge {
                    size: widened.record_size(),
                    capacity: PAGE_BODY_SIZE,
                });
            }

            let old_pages = Self::chain(zone, info.entry.table.object_page())?;
            let mut rows = Vec::new();
            for page_id in &old_pages {
                let handle = zone.page(*page_id)?;
                let page = handle.lock();
                rows.extend(page.as_object()?.rows()?);
            }

            let count = widened.attribute_count();
            let value_root = zone
                .allocate(|id| Ok(Self::attribute_page(attribute_type, id)))?
                .page_id();
            let object_root = zone
                .allocate(|id| ObjectPage::new(id, count).map(Page::from))?
                .page_id();

            let mut tail = object_root;
            for (_, entries) in &rows {
                let row = Self::insert_row(zone, tail, count, entries)?;
                tail = row.page_id;
                for (index, entry) in entries.iter().enumerate() {
                    if !entry.is_null() {
                        Self::set_backlink(zone, info.types[index], *entry, row)?;
                    }
                }
            }
            zone.delete(&old_pages)?;

            let mut attributes = info.entry.table.attributes().to_vec();
            attributes.push(AttributeDescription::new(name, value_root));
            let description = TableDescription::new(table, object_root, attributes);
            Self::remove_catalog(zone, &info.entry)?;
            Self::insert_catalog(zone, &description)?;

            info!(table, attribute = name, rows = rows.len(), "added attribute");
            Ok(description)
        })
    }

    pub fn describe_table(&self, name: &str) -> Result<TableDescription> {
        self.run(|zone| Ok(Self::require_table(zone, name)?.entry.table))
    }

    /// The table's attributes with their types, in catalog order.
    pub fn table_schema(&self, name: &str) -> Result<TableSchema> {
        self.run(|zone| {
            let info = Self::require_table(zone, name)?;
            let attributes = info
                .entry
                .table
                .attributes()
                .iter()
                .zip(&info.types)
                .map(|(attribute, attribute_type)| {
                    AttributeDefinition::new(attribute.name.clone(), *attribute_type)
                })
                .collect();
            Ok(TableSchema::new(name, attributes))
        })
    }

    /// Names of all tables, in catalog order.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.run(|zone| {
            let mut names = Vec::new();
            for page_id in Self::chain(zone, CATALOG_ROOT_PAGE_ID)? {
                let handle = zone.page(page_id)?;
                let page = handle.lock();
                for (_, table) in page.as_catalog()?.records()? {
                    names.push(table.name().to_string());
                }
            }
            Ok(names)
        })
    }

    fn find_table(zone: &Zone<'_>, name: &str) -> Result<Option<CatalogEntry>> {
        let mut next = Some(CATALOG_ROOT_PAGE_ID);
        while let Some(page_id) = next {
            let handle = zone.page(page_id)?;
            let page = handle.lock();
            let catalog = page.as_catalog()?;
            if let Some((offset, table)) = catalog.find(name)? {
                return Ok(Some(CatalogEntry {
                    page_id,
                    offset,
                    table,
                }));
            }
            next = catalog.next_page();
        }
        Ok(None)
    }

    fn require_table(zone: &Zone<'_>, name: &str) -> Result<TableInfo> {
        let entry = Self::find_table(zone, name)?
            .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;
        let mut types = Vec::with_capacity(entry.table.attribute_count());
        for attribute in entry.table.attributes() {
            let handle = zone.page(attribute.page_id)?;
            let page_type = handle.lock().page_type();
            types.push(AttributeType::from_page_type(page_type)?);
        }
        Ok(TableInfo { entry, types })
    }

    /// Writes `table` into the first catalog page with room, chaining a new
    /// catalog page when every page is full.
    fn insert_catalog(zone: &Zone<'_>, table: &TableDescription) -> Result<()> {
        let mut page_id = CATALOG_ROOT_PAGE_ID;
        loop {
            let handle = zone.page(page_id)?;
            let next = {
                let mut page = handle.lock();
                let catalog = page.as_catalog_mut()?;
                if catalog.insert(table)?.is_some() {
                    return Ok(());
                }
                catalog.next_page()
            };
            page_id = match next {
                Some(next) => next,
                None => Self::chain_new_page(zone, &handle, |id| Ok(CatalogPage::new(id).into()))?,
            };
        }
    }

    fn remove_catalog(zone: &Zone<'_>, entry: &CatalogEntry) -> Result<()> {
        let handle = zone.page(entry.page_id)?;
        let mut page = handle.lock();
        page.as_catalog_mut()?.remove(entry.offset)?;
        Ok(())
    }

    // Objects

    /// Stores one object and returns the address of its row. Attributes
    /// missing from `values` are stored as null.
    ///
    /// If writing a value fails, the values already written and the row
    /// slot are released again before the error is returned.
    pub fn add_object(&self, table: &str, values: &Row) -> Result<Address> {
        self.run(|zone| {
            let info = Self::require_table(zone, table)?;
            info.check_values(values)?;

            let count = info.entry.table.attribute_count();
            let mark = zone.chain_mark();
            let row = Self::insert_row(zone, info.entry.table.object_page(), count, &[])?;
            let mut written = Vec::new();
            match Self::write_values(zone, &info, row, values, &mut written) {
                Ok(()) => {
                    debug!(table, %row, "added object");
                    Ok(row)
                }
                Err(err) => {
                    warn!(table, %row, written = written.len(), error = %err, "rolling back insert");
                    let rollback = Self::discard_row(zone, row, &written)
                        .and_then(|_| Self::unchain_since(zone, mark));
                    if let Err(rollback) = rollback {
                        warn!(table, %row, error = %rollback, "insert rollback incomplete");
                    }
                    Err(err)
                }
            }
        })
    }

    fn write_values(
        zone: &Zone<'_>,
        info: &TableInfo,
        row: Address,
        values: &Row,
        written: &mut Vec<Address>,
    ) -> Result<()> {
        for (index, attribute) in info.entry.table.attributes().iter().enumerate() {
            let value = values.get(&attribute.name);
            if value.is_null() {
                continue;
            }
            let address = Self::insert_value(zone, attribute.page_id, value, row)?;
            written.push(address);
            Self::set_row_entry(zone, row, index, address)?;
        }
        Ok(())
    }

    fn discard_row(zone: &Zone<'_>, row: Address, written: &[Address]) -> Result<()> {
        for address in written {
            Self::release_record(zone, *address)?;
        }
        let handle = zone.page(row.page_id)?;
        let mut page = handle.lock();
        page.as_object_mut()?.remove(row.offset)?;
        Ok(())
    }

    /// Returns every object satisfying all `conditions`.
    ///
    /// The first condition drives a scan of its attribute's value pages;
    /// the others are checked against the reconstructed rows.
    pub fn search_object(&self, table: &str, conditions: &[Condition]) -> Result<Vec<Row>> {
        self.run(|zone| {
            let info = Self::require_table(zone, table)?;
            let matches = Self::find_matches(zone, &info, conditions)?;
            Ok(matches.into_iter().map(|(_, row)| row).collect())
        })
    }

    /// Deletes every object satisfying all `conditions` and returns how
    /// many were deleted.
    pub fn delete_object(&self, table: &str, conditions: &[Condition]) -> Result<usize> {
        self.run(|zone| {
            let info = Self::require_table(zone, table)?;
            let matches = Self::find_matches(zone, &info, conditions)?;
            for (row, _) in &matches {
                Self::delete_row(zone, *row)?;
            }
            debug!(table, deleted = matches.len(), "deleted objects");
            Ok(matches.len())
        })
    }

    /// Overwrites the attributes named in `values` on every object
    /// satisfying all `conditions`. Returns how many objects changed.
    pub fn update_object(
        &self,
        table: &str,
        conditions: &[Condition],
        values: &Row,
    ) -> Result<usize> {
        self.run(|zone| {
            let info = Self::require_table(zone, table)?;
            info.check_values(values)?;
            let matches = Self::find_matches(zone, &info, conditions)?;

            for (row, _) in &matches {
                let entries = Self::row_entries(zone, *row)?;
                for (name, value) in values.iter() {
                    let index = info.index_of(name)?;
                    let entry = entries[index];
                    match (entry.is_null(), value) {
                        (true, Value::Null) => {}
                        (true, value) => {
                            let root = info.entry.table.attributes()[index].page_id;
                            let address = Self::insert_value(zone, root, value, *row)?;
                            Self::set_row_entry(zone, *row, index, address)?;
                        }
                        (false, Value::Null) => {
                            Self::release_record(zone, entry)?;
                            Self::set_row_entry(zone, *row, index, Address::NULL)?;
                        }
                        (false, value) => Self::replace_value(zone, entry, value)?,
                    }
                }
            }
            debug!(table, updated = matches.len(), "updated objects");
            Ok(matches.len())
        })
    }

    fn find_matches(
        zone: &Zone<'_>,
        info: &TableInfo,
        conditions: &[Condition],
    ) -> Result<Vec<(Address, Row)>> {
        let mut indexes = Vec::with_capacity(conditions.len());
        for condition in conditions {
            indexes.push(info.check_condition(condition)?);
        }

        let candidates = match (conditions.first(), indexes.first()) {
            (Some(first), Some(index)) => {
                let root = info.entry.table.attributes()[*index].page_id;
                Self::scan_attribute(zone, root, first)?
            }
            _ => Self::all_rows(zone, info.entry.table.object_page())?,
        };

        let rest = conditions.get(1..).unwrap_or_default();
        let mut matches = Vec::new();
        for row in candidates {
            let values = Self::read_row(zone, info, row)?;
            if rest
                .iter()
                .all(|condition| condition.matches(values.get(&condition.attribute)))
            {
                matches.push((row, values));
            }
        }
        Ok(matches)
    }

    fn scan_attribute(zone: &Zone<'_>, root: PageId, condition: &Condition) -> Result<Vec<Address>> {
        match &condition.value {
            Value::String(operand) => Self::scan_typed(zone, root, condition, operand),
            Value::Integer(operand) => Self::scan_typed(zone, root, condition, operand),
            Value::Boolean(operand) => Self::scan_typed(zone, root, condition, operand),
            Value::Null => Ok(Vec::new()),
        }
    }

    fn scan_typed<T: AttributeVariant>(
        zone: &Zone<'_>,
        root: PageId,
        condition: &Condition,
        operand: &T,
    ) -> Result<Vec<Address>> {
        let mut rows = Vec::new();
        let mut next = Some(root);
        while let Some(page_id) = next {
            let handle = zone.page(page_id)?;
            let page = handle.lock();
            let values = page.as_attribute::<T>()?;
            rows.extend(values.scan(condition.operator, operand)?);
            next = values.next_page();
        }
        Ok(rows)
    }

    fn all_rows(zone: &Zone<'_>, root: PageId) -> Result<Vec<Address>> {
        let mut rows = Vec::new();
        let mut next = Some(root);
        while let Some(page_id) = next {
            let handle = zone.page(page_id)?;
            let page = handle.lock();
            let objects = page.as_object()?;
            for offset in objects.used_slots()? {
                rows.push(Address::new(page_id, offset as i16));
            }
            next = objects.next_page();
        }
        Ok(rows)
    }

    fn row_entries(zone: &Zone<'_>, row: Address) -> Result<Vec<Address>> {
        let handle = zone.page(row.page_id)?;
        let page = handle.lock();
        let entries = page.as_object()?.row(row.offset)?;
        Ok(entries)
    }

    fn read_row(zone: &Zone<'_>, info: &TableInfo, row: Address) -> Result<Row> {
        let entries = Self::row_entries(zone, row)?;
        let mut values = Row::new();
        for (index, attribute) in info.entry.table.attributes().iter().enumerate() {
            let value = match entries.get(index) {
                Some(entry) if !entry.is_null() => {
                    Self::read_value(zone, info.types[index], *entry)?
                }
                _ => Value::Null,
            };
            values.insert(attribute.name.clone(), value);
        }
        Ok(values)
    }

    fn read_value(zone: &Zone<'_>, attribute_type: AttributeType, address: Address) -> Result<Value> {
        let handle = zone.page(address.page_id)?;
        let page = handle.lock();
        let value = match attribute_type {
            AttributeType::String => {
                Value::String(page.as_attribute::<String>()?.value(address.offset)?)
            }
            AttributeType::Integer => {
                Value::Integer(page.as_attribute::<i64>()?.value(address.offset)?)
            }
            AttributeType::Boolean => {
                Value::Boolean(page.as_attribute::<bool>()?.value(address.offset)?)
            }
        };
        Ok(value)
    }

    /// Releases the row's values one by one, nulling each row entry right
    /// after its value is gone, then frees the row slot.
    fn delete_row(zone: &Zone<'_>, row: Address) -> Result<()> {
        let entries = Self::row_entries(zone, row)?;
        for (index, entry) in entries.iter().enumerate() {
            if entry.is_null() {
                continue;
            }
            Self::release_record(zone, *entry)?;
            Self::set_row_entry(zone, row, index, Address::NULL)?;
        }
        let handle = zone.page(row.page_id)?;
        let mut page = handle.lock();
        page.as_object_mut()?.remove(row.offset)?;
        Ok(())
    }

    /// Stores `entries` in the first object page with a free slot,
    /// starting at `start` and chaining a new page at the end if needed.
    fn insert_row(
        zone: &Zone<'_>,
        start: PageId,
        count: usize,
        entries: &[Address],
    ) -> Result<Address> {
        let mut page_id = start;
        loop {
            let handle = zone.page(page_id)?;
            let next = {
                let mut page = handle.lock();
                let objects = page.as_object_mut()?;
                if let Some(offset) = objects.insert(entries)? {
                    return Ok(Address::new(page_id, offset));
                }
                objects.next_page()
            };
            page_id = match next {
                Some(next) => next,
                None => Self::chain_new_page(zone, &handle, |id| {
                    ObjectPage::new(id, count).map(Page::from)
                })?,
            };
        }
    }

    fn set_row_entry(zone: &Zone<'_>, row: Address, index: usize, address: Address) -> Result<()> {
        let handle = zone.page(row.page_id)?;
        let mut page = handle.lock();
        page.as_object_mut()?.set_entry(row.offset, index, address)?;
        Ok(())
    }

    // Values

    fn insert_value(zone: &Zone<'_>, root: PageId, value: &Value, backlink: Address) -> Result<Address> {
        match value {
            Value::String(value) => Self::insert_typed(zone, root, value, backlink),
            Value::Integer(value) => Self::insert_typed(zone, root, value, backlink),
            Value::Boolean(value) => Self::insert_typed(zone, root, value, backlink),
            Value::Null => Ok(Address::NULL),
        }
    }

    /// Follows the value chain from `root` and stores `value` in the first
    /// page with room. A new page is chained only after the whole chain
    /// was found full.
    fn insert_typed<T: AttributeVariant>(
        zone: &Zone<'_>,
        root: PageId,
        value: &T,
        backlink: Address,
    ) -> Result<Address> {
        let mut page_id = root;
        loop {
            let handle = zone.page(page_id)?;
            let next = {
                let mut page = handle.lock();
                let values = page.as_attribute_mut::<T>()?;
                if let Some(address) = values.insert(value, backlink)? {
                    return Ok(address);
                }
                values.next_page()
            };
            page_id = match next {
                Some(next) => next,
                None => Self::chain_new_page(zone, &handle, |id| {
                    Ok(AttributePage::<T>::new(id).into())
                })?,
            };
        }
    }

    fn replace_value(zone: &Zone<'_>, address: Address, value: &Value) -> Result<()> {
        let handle = zone.page(address.page_id)?;
        let mut page = handle.lock();
        match value {
            Value::String(value) => page
                .as_attribute_mut::<String>()?
                .replace(address.offset, value)?,
            Value::Integer(value) => page
                .as_attribute_mut::<i64>()?
                .replace(address.offset, value)?,
            Value::Boolean(value) => page
                .as_attribute_mut::<bool>()?
                .replace(address.offset, value)?,
            Value::Null => {}
        }
        Ok(())
    }

    fn set_backlink(
        zone: &Zone<'_>,
        attribute_type: AttributeType,
        record: Address,
        backlink: Address,
    ) -> Result<()> {
        let handle = zone.page(record.page_id)?;
        let mut page = handle.lock();
        match attribute_type {
            AttributeType::String => page
                .as_attribute_mut::<String>()?
                .set_backlink(record.offset, backlink)?,
            AttributeType::Integer => page
                .as_attribute_mut::<i64>()?
                .set_backlink(record.offset, backlink)?,
            AttributeType::Boolean => page
                .as_attribute_mut::<bool>()?
                .set_backlink(record.offset, backlink)?,
        }
        Ok(())
    }

    fn release_record(zone: &Zone<'_>, address: Address) -> Result<()> {
        let handle = zone.page(address.page_id)?;
        let mut page = handle.lock();
        page.release_slot(address.offset)?;
        Ok(())
    }

    // Chains

    /// Allocates a page and links it behind `tail`. The guard on `tail` is
    /// only taken after the allocation.
    fn chain_new_page(
        zone: &Zone<'_>,
        tail: &PageHandle,
        build: impl FnOnce(PageId) -> Result<Page>,
    ) -> Result<PageId> {
        let fresh = zone.allocate(build)?.page_id();
        tail.lock().set_next_page(Some(fresh));
        zone.chained.borrow_mut().push((tail.page_id(), fresh));
        debug!(tail = tail.page_id().as_i32(), page = fresh.as_i32(), "chained page");
        Ok(fresh)
    }

    /// Unlinks the pages chained since `mark`, newest first, and returns
    /// them to the free chain. They must hold no live records.
    fn unchain_since(zone: &Zone<'_>, mark: usize) -> Result<()> {
        let links = {
            let mut chained = zone.chained.borrow_mut();
            let mark = mark.min(chained.len());
            chained.split_off(mark)
        };
        for (tail, fresh) in links.into_iter().rev() {
            let handle = zone.page(tail)?;
            {
                let mut page = handle.lock();
                if page.next_page() == Some(fresh) {
                    page.set_next_page(None);
                }
            }
            zone.delete(&[fresh])?;
            debug!(tail = tail.as_i32(), page = fresh.as_i32(), "unchained page");
        }
        Ok(())
    }

    /// Page ids of the chain starting at `root`.
    fn chain(zone: &Zone<'_>, root: PageId) -> Result<Vec<PageId>> {
        let mut pages = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(root);
        while let Some(page_id) = next {
            if !seen.insert(page_id) {
                return Err(DbError::InvalidDatabaseFile(format!(
                    "page chain from {} loops at {}",
                    root, page_id
                )));
            }
            let handle = zone.page(page_id)?;
            next = handle.lock().next_page();
            pages.push(page_id);
        }
        Ok(pages)
    }

    // Maintenance

    /// Merges adjacent free runs on every page of the table and on the
    /// catalog pages. Returns the number of merges.
    pub fn compact_table(&self, name: &str) -> Result<usize> {
        self.run(|zone| {
            let entry = Self::find_table(zone, name)?
                .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

            let mut pages = Self::chain(zone, CATALOG_ROOT_PAGE_ID)?;
            for root in entry.table.root_pages() {
                pages.extend(Self::chain(zone, root)?);
            }

            let mut merges = 0;
            for page_id in pages {
                let handle = zone.page(page_id)?;
                merges += handle.lock().coalesce()?;
            }
            debug!(table = name, merges, "compacted table");
            Ok(merges)
        })
    }

    /// Page count, free bytes and row count of a table.
    pub fn table_stats(&self, name: &str) -> Result<TableStats> {
        self.run(|zone| {
            let entry = Self::find_table(zone, name)?
                .ok_or_else(|| DbError::TableNotFound(name.to_string()))?;

            let mut stats = TableStats::default();
            for root in entry.table.root_pages() {
                for page_id in Self::chain(zone, root)? {
                    let handle = zone.page(page_id)?;
                    let page = handle.lock();
                    stats.pages += 1;
                    stats.free_bytes += page.free_bytes()?;
                    if let Page::Object(objects) = &*page {
                        stats.rows += objects.used_slots()?.len();
                    }
                }
            }
            Ok(stats)
        })
    }
}
