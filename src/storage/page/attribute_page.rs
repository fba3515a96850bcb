use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::common::{
    Address, DbError, Operator, PageId, PageType, Result, ADDRESS_SIZE, STRING_SIZE,
};

use super::codec::{PageReader, PageWriter};
use super::slotted_page::SlottedPage;

/// A value type that can be stored on an attribute page.
pub trait AttributeValue: Sized + Clone + PartialEq + fmt::Debug {
    const PAGE_TYPE: PageType;
    /// Encoded width of the value, without the back-link.
    const VALUE_SIZE: usize;

    /// Rejects values that do not fit the fixed width.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    fn encode(&self, writer: &mut PageWriter<'_>) -> Result<()>;

    fn decode(reader: &mut PageReader<'_>) -> Result<Self>;

    /// Evaluates `self <op> operand`. Only called with operators for
    /// which `Operator::supported_on(Self::PAGE_TYPE)` holds.
    fn matches(&self, op: Operator, operand: &Self) -> bool;
}

impl AttributeValue for String {
    const PAGE_TYPE: PageType = PageType::String;
    const VALUE_SIZE: usize = STRING_SIZE;

    fn check(&self) -> Result<()> {
        let len = self.as_bytes().len();
        if len > STRING_SIZE {
            return Err(DbError::ValueTooLong {
                len,
                max: STRING_SIZE,
            });
        }
        Ok(())
    }

    fn encode(&self, writer: &mut PageWriter<'_>) -> Result<()> {
        self.check()?;
        writer.write_padded_str(self, STRING_SIZE)
    }

    fn decode(reader: &mut PageReader<'_>) -> Result<Self> {
        reader.read_padded_str(STRING_SIZE)
    }

    fn matches(&self, op: Operator, operand: &Self) -> bool {
        match op {
            Operator::Eq => self == operand,
            Operator::Ne => self != operand,
            Operator::Contains => self.contains(operand.as_str()),
            Operator::EqIgnoreCase => self.to_lowercase() == operand.to_lowercase(),
            _ => false,
        }
    }
}

impl AttributeValue for i64 {
    const PAGE_TYPE: PageType = PageType::Integer;
    const VALUE_SIZE: usize = 8;

    fn encode(&self, writer: &mut PageWriter<'_>) -> Result<()> {
        writer.write_i64(*self)
    }

    fn decode(reader: &mut PageReader<'_>) -> Result<Self> {
        reader.read_i64()
    }

    fn matches(&self, op: Operator, operand: &Self) -> bool {
        match op {
            Operator::Eq => self == operand,
            Operator::Ne => self != operand,
            Operator::Lt => self < operand,
            Operator::Le => self <= operand,
            Operator::Gt => self > operand,
            Operator::Ge => self >= operand,
            _ => false,
        }
    }
}

impl AttributeValue for bool {
    const PAGE_TYPE: PageType = PageType::Boolean;
    const VALUE_SIZE: usize = 1;

    fn encode(&self, writer: &mut PageWriter<'_>) -> Result<()> {
        writer.write_u8(u8::from(*self))
    }

    fn decode(reader: &mut PageReader<'_>) -> Result<Self> {
        Ok(reader.read_u8()? != 0)
    }

    fn matches(&self, op: Operator, operand: &Self) -> bool {
        match op {
            Operator::Eq => self == operand,
            Operator::Ne => self != operand,
            _ => false,
        }
    }
}

/// One stored value together with the row that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord<T> {
    pub offset: i16,
    pub backlink: Address,
    pub value: T,
}

/// Fixed-size value page: each record is a back-link to the owning object
/// row followed by the encoded value.
pub struct AttributePage<T: AttributeValue> {
    inner: SlottedPage,
    _marker: PhantomData<T>,
}

pub type StringPage = AttributePage<String>;
pub type IntegerPage = AttributePage<i64>;
pub type BooleanPage = AttributePage<bool>;

impl<T: AttributeValue> AttributePage<T> {
    pub const RECORD_SIZE: usize = ADDRESS_SIZE + T::VALUE_SIZE;

    pub fn new(page_id: PageId) -> Self {
        Self {
            inner: SlottedPage::new(page_id, T::PAGE_TYPE, Some(Self::RECORD_SIZE)),
            _marker: PhantomData,
        }
    }

    pub fn from_page(inner: SlottedPage) -> Result<Self> {
        let found = inner.page_type()?;
        if found != T::PAGE_TYPE {
            return Err(DbError::UnexpectedPageType {
                page: inner.page_id(),
                expected: T::PAGE_TYPE,
                found,
            });
        }
        Ok(Self {
            inner,
            _marker: PhantomData,
        })
    }

    /// Stores `value` owned by the row at `backlink`. Returns the record
    /// address, or `None` when the page is full.
    pub fn insert(&mut self, value: &T, backlink: Address) -> Result<Option<Address>> {
        value.check()?;
        let Some(extent) = self.inner.allocate(Self::RECORD_SIZE)? else {
            return Ok(None);
        };
        let mut writer = self.inner.writer(extent.offset)?;
        writer.write_address(backlink)?;
        value.encode(&mut writer)?;
        Ok(Some(Address::new(self.inner.page_id(), extent.offset as i16)))
    }

    pub fn get(&self, offset: i16) -> Result<AttributeRecord<T>> {
        let start = self.inner.check_slot(offset)?;
        let mut reader = self.inner.reader(start)?;
        let backlink = reader.read_address()?;
        let value = T::decode(&mut reader)?;
        Ok(AttributeRecord {
            offset,
            backlink,
            value,
        })
    }

    pub fn value(&self, offset: i16) -> Result<T> {
        Ok(self.get(offset)?.value)
    }

    /// Rewrites the value in place, keeping the back-link.
    pub fn replace(&mut self, offset: i16, value: &T) -> Result<()> {
        value.check()?;
        let start = self.inner.check_slot(offset)?;
        value.encode(&mut self.inner.writer(start + ADDRESS_SIZE)?)
    }

    pub fn set_backlink(&mut self, offset: i16, backlink: Address) -> Result<()> {
        let start = self.inner.check_slot(offset)?;
        self.inner.writer(start)?.write_address(backlink)
    }

    pub fn remove(&mut self, offset: i16) -> Result<()> {
        self.inner.release_slot(offset)
    }

    pub fn records(&self) -> Result<Vec<AttributeRecord<T>>> {
        self.inner
            .used_slots()?
            .into_iter()
            .map(|offset| self.get(offset as i16))
            .collect()
    }

    /// Back-links of every record whose value satisfies `value <op> operand`.
    pub fn scan(&self, op: Operator, operand: &T) -> Result<Vec<Address>> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|record| !record.backlink.is_null() && record.value.matches(op, operand))
            .map(|record| record.backlink)
            .collect())
    }

    pub fn into_inner(self) -> SlottedPage {
        self.inner
    }
}

impl<T: AttributeValue> Deref for AttributePage<T> {
    type Target = SlottedPage;

    fn deref(&self) -> &SlottedPage {
        &self.inner
    }
}

impl<T: AttributeValue> DerefMut for AttributePage<T> {
    fn deref_mut(&mut self) -> &mut SlottedPage {
        &mut self.inner
    }
}
