use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::common::{DbError, PageId, PageType, Result, PAGE_SIZE};

use super::attribute_page::{AttributePage, AttributeValue, BooleanPage, IntegerPage, StringPage};
use super::catalog_page::CatalogPage;
use super::free_page::FreePage;
use super::header_page::HeaderPage;
use super::object_page::ObjectPage;
use super::slotted_page::SlottedPage;

/// A cached page, tagged by its on-disk type.
pub enum Page {
    Header(HeaderPage),
    Catalog(CatalogPage),
    Object(ObjectPage),
    String(StringPage),
    Integer(IntegerPage),
    Boolean(BooleanPage),
    Free(FreePage),
}

macro_rules! page_accessors {
    ($($variant:ident => $as_ref:ident, $as_mut:ident, $ty:ty, $page_type:expr;)*) => {
        $(
            pub fn $as_ref(&self) -> Result<&$ty> {
                match self {
                    Page::$variant(page) => Ok(page),
                    other => Err(other.unexpected($page_type)),
                }
            }

            pub fn $as_mut(&mut self) -> Result<&mut $ty> {
                match self {
                    Page::$variant(page) => Ok(page),
                    other => Err(other.unexpected($page_type)),
                }
            }
        )*
    };
}

impl Page {
    /// Decodes raw page bytes according to the type code in the header.
    pub fn from_bytes(page_id: PageId, data: Box<[u8; PAGE_SIZE]>) -> Result<Self> {
        Self::from_slotted(SlottedPage::from_bytes(page_id, data))
    }

    pub fn from_slotted(inner: SlottedPage) -> Result<Self> {
        Ok(match inner.page_type()? {
            PageType::Header => Page::Header(HeaderPage::from_page(inner)?),
            PageType::Catalog => Page::Catalog(CatalogPage::from_page(inner)?),
            PageType::Object => Page::Object(ObjectPage::from_page(inner)?),
            PageType::String => Page::String(StringPage::from_page(inner)?),
            PageType::Integer => Page::Integer(IntegerPage::from_page(inner)?),
            PageType::Boolean => Page::Boolean(BooleanPage::from_page(inner)?),
            PageType::Free => Page::Free(FreePage::from_page(inner)?),
        })
    }

    pub fn page_type(&self) -> PageType {
        match self {
            Page::Header(_) => PageType::Header,
            Page::Catalog(_) => PageType::Catalog,
            Page::Object(_) => PageType::Object,
            Page::String(_) => PageType::String,
            Page::Integer(_) => PageType::Integer,
            Page::Boolean(_) => PageType::Boolean,
            Page::Free(_) => PageType::Free,
        }
    }

    fn unexpected(&self, expected: PageType) -> DbError {
        DbError::UnexpectedPageType {
            page: self.page_id(),
            expected,
            found: self.page_type(),
        }
    }

    page_accessors! {
        Header => as_header, as_header_mut, HeaderPage, PageType::Header;
        Catalog => as_catalog, as_catalog_mut, CatalogPage, PageType::Catalog;
        Object => as_object, as_object_mut, ObjectPage, PageType::Object;
        Free => as_free, as_free_mut, FreePage, PageType::Free;
    }

    pub fn as_attribute<T: AttributeVariant>(&self) -> Result<&AttributePage<T>> {
        T::view(self).ok_or_else(|| self.unexpected(T::PAGE_TYPE))
    }

    pub fn as_attribute_mut<T: AttributeVariant>(&mut self) -> Result<&mut AttributePage<T>> {
        let expected = self.unexpected(T::PAGE_TYPE);
        T::view_mut(self).ok_or(expected)
    }

    pub fn into_slotted(self) -> SlottedPage {
        match self {
            Page::Header(page) => page.into_inner(),
            Page::Catalog(page) => page.into_inner(),
            Page::Object(page) => page.into_inner(),
            Page::String(page) => page.into_inner(),
            Page::Integer(page) => page.into_inner(),
            Page::Boolean(page) => page.into_inner(),
            Page::Free(page) => page.into_inner(),
        }
    }
}

impl Deref for Page {
    type Target = SlottedPage;

    fn deref(&self) -> &SlottedPage {
        match self {
            Page::Header(page) => &**page,
            Page::Catalog(page) => &**page,
            Page::Object(page) => &**page,
            Page::String(page) => &**page,
            Page::Integer(page) => &**page,
            Page::Boolean(page) => &**page,
            Page::Free(page) => &**page,
        }
    }
}

impl DerefMut for Page {
    fn deref_mut(&mut self) -> &mut SlottedPage {
        match self {
            Page::Header(page) => &mut **page,
            Page::Catalog(page) => &mut **page,
            Page::Object(page) => &mut **page,
            Page::String(page) => &mut **page,
            Page::Integer(page) => &mut **page,
            Page::Boolean(page) => &mut **page,
            Page::Free(page) => &mut **page,
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner: &SlottedPage = self;
        fmt::Display::fmt(inner, f)
    }
}

impl From<HeaderPage> for Page {
    fn from(page: HeaderPage) -> Self {
        Page::Header(page)
    }
}

impl From<CatalogPage> for Page {
    fn from(page: CatalogPage) -> Self {
        Page::Catalog(page)
    }
}

impl From<ObjectPage> for Page {
    fn from(page: ObjectPage) -> Self {
        Page::Object(page)
    }
}

impl From<FreePage> for Page {
    fn from(page: FreePage) -> Self {
        Page::Free(page)
    }
}

/// Maps an attribute value type onto its `Page` variant.
pub trait AttributeVariant: AttributeValue {
    fn view(page: &Page) -> Option<&AttributePage<Self>>;
    fn view_mut(page: &mut Page) -> Option<&mut AttributePage<Self>>;
    fn wrap(page: AttributePage<Self>) -> Page;
}

macro_rules! attribute_variant {
    ($ty:ty, $variant:ident) => {
        impl AttributeVariant for $ty {
            fn view(page: &Page) -> Option<&AttributePage<Self>> {
                match page {
                    Page::$variant(page) => Some(page),
                    _ => None,
                }
            }

            fn view_mut(page: &mut Page) -> Option<&mut AttributePage<Self>> {
                match page {
                    Page::$variant(page) => Some(page),
                    _ => None,
                }
            }

            fn wrap(page: AttributePage<Self>) -> Page {
                Page::$variant(page)
            }
        }
    };
}

attribute_variant!(String, String);
attribute_variant!(i64, Integer);
attribute_variant!(bool, Boolean);

impl<T: AttributeVariant> From<AttributePage<T>> for Page {
    fn from(page: AttributePage<T>) -> Self {
        T::wrap(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Address;

    #[test]
    fn test_page_round_trips_through_bytes() {
        let mut page: Page = IntegerPage::new(PageId::new(4)).into();
        page.as_attribute_mut::<i64>()
            .unwrap()
            .insert(&42, Address::new(PageId::new(2), 0))
            .unwrap();

        let bytes = Box::new(*page.data());
        let decoded = Page::from_bytes(PageId::new(4), bytes).unwrap();
        assert_eq!(decoded.page_type(), PageType::Integer);
        assert_eq!(decoded.as_attribute::<i64>().unwrap().value(0).unwrap(), 42);
    }

    #[test]
    fn test_wrong_variant_access() {
        let page: Page = ObjectPage::new(PageId::new(2), 1).unwrap().into();
        assert!(matches!(
            page.as_catalog(),
            Err(DbError::UnexpectedPageType {
                expected: PageType::Catalog,
                found: PageType::Object,
                ..
            })
        ));
        assert!(page.as_attribute::<String>().is_err());
    }

    #[test]
    fn test_unknown_type_code() {
        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[..2].copy_from_slice(&7i16.to_be_bytes());
        assert!(matches!(
            Page::from_bytes(PageId::new(3), data),
            Err(DbError::UnknownPageType(7))
        ));
    }
}
