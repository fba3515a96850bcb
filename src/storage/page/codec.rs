//! Cursor-based big-endian encoding over a page body.
//!
//! A `PageReader`/`PageWriter` is positioned once (see
//! `SlottedPage::reader`/`SlottedPage::writer`) and then moves strictly
//! forward. Running past the end of the page is reported as
//! `DbError::CursorOutOfRange` instead of panicking.

use bytes::{Buf, BufMut};

use crate::common::{Address, DbError, PageId, Result, PAGE_HEADER_SIZE};

/// Forward-only reader over page bytes.
pub struct PageReader<'a> {
    buf: &'a [u8],
    start: usize,
}

impl<'a> PageReader<'a> {
    /// `start` is the body offset the cursor was placed on; it is only
    /// kept for error reporting.
    pub fn new(buf: &'a [u8], start: usize) -> Self {
        Self { buf, start }
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(DbError::CursorOutOfRange {
                offset: self.start,
                header: PAGE_HEADER_SIZE,
            });
        }
        Ok(())
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_address(&mut self) -> Result<Address> {
        let page = self.read_i32()?;
        let offset = self.read_i16()?;
        Ok(Address::new(PageId::new(page), offset))
    }

    /// Reads a fixed-width, space-padded UTF-8 field and trims the padding.
    pub fn read_padded_str(&mut self, width: usize) -> Result<String> {
        let bytes = self.read_bytes(width)?;
        let text = String::from_utf8_lossy(bytes);
        Ok(text.trim_end_matches(' ').to_string())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.buf.advance(len);
        Ok(())
    }
}

/// Forward-only writer over page bytes.
pub struct PageWriter<'a> {
    buf: &'a mut [u8],
    start: usize,
}

impl<'a> PageWriter<'a> {
    pub fn new(buf: &'a mut [u8], start: usize) -> Self {
        Self { buf, start }
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining_mut() < needed {
            return Err(DbError::CursorOutOfRange {
                offset: self.start,
                header: PAGE_HEADER_SIZE,
            });
        }
        Ok(())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        self.ensure(2)?;
        self.buf.put_i16(value);
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.ensure(4)?;
        self.buf.put_i32(value);
        Ok(())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.ensure(8)?;
        self.buf.put_i64(value);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.ensure(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn write_address(&mut self, address: Address) -> Result<()> {
        self.write_i32(address.page_id.as_i32())?;
        self.write_i16(address.offset)
    }

    /// Writes `text` into a fixed-width field, padding with spaces.
    /// The caller validates the length beforehand.
    pub fn write_padded_str(&mut self, text: &str, width: usize) -> Result<()> {
        let bytes = text.as_bytes();
        self.ensure(width)?;
        let len = bytes.len().min(width);
        self.buf.put_slice(&bytes[..len]);
        self.buf.put_bytes(b' ', width - len);
        Ok(())
    }
}

/// Returns the UTF-8 length of `text`, or an error when it does not fit in
/// a `width`-byte field.
pub fn check_name(text: &str, width: usize) -> Result<()> {
    let len = text.as_bytes().len();
    if len > width {
        return Err(DbError::NameTooLong {
            name: text.to_string(),
            len,
            max: width,
        });
    }
    Ok(())
}
