//! Integration tests for slotted page storage

use proptest::prelude::*;

use slotdb::catalog::{AttributeDescription, TableDescription};
use slotdb::common::{Address, PageId, PageType, PAGE_BODY_SIZE};
use slotdb::storage::page::{CatalogPage, Extent, IntegerPage, Page, SlottedPage, StringPage};

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (4usize..400).prop_map(Op::Allocate),
        any::<usize>().prop_map(Op::Release),
    ]
}

fn disjoint(a: &Extent, b: &Extent) -> bool {
    a.offset + a.len <= b.offset || b.offset + b.len <= a.offset
}

proptest! {
    #[test]
    fn test_free_list_round_trip(ops in prop::collection::vec(op(), 1..200)) {
        let mut page = SlottedPage::new(PageId::new(7), PageType::Catalog, None);
        let mut held: Vec<Extent> = Vec::new();

        for op in ops {
            match op {
                Op::Allocate(size) => {
                    if let Some(extent) = page.allocate(size).unwrap() {
                        prop_assert!(extent.len >= size);
                        prop_assert!(extent.offset + extent.len <= PAGE_BODY_SIZE);
                        for other in &held {
                            prop_assert!(disjoint(&extent, other));
                        }
                        held.push(extent);
                    }
                }
                Op::Release(pick) => {
                    if !held.is_empty() {
                        let extent = held.swap_remove(pick % held.len());
                        page.release(extent.offset, extent.len).unwrap();
                    }
                }
            }
            let held_bytes: usize = held.iter().map(|e| e.len).sum();
            prop_assert_eq!(page.free_bytes().unwrap() + held_bytes, PAGE_BODY_SIZE);
        }

        for extent in held.drain(..) {
            page.release(extent.offset, extent.len).unwrap();
        }
        prop_assert_eq!(page.free_bytes().unwrap(), PAGE_BODY_SIZE);

        // Fragmented until compacted
        page.coalesce().unwrap();
        let runs = page.free_runs().unwrap();
        prop_assert_eq!(runs.len(), 1);
        prop_assert_eq!(runs[0].offset, 0);
    }
}

#[test]
fn test_string_page_fills_and_drains() {
    let mut page = StringPage::new(PageId::new(3));
    let capacity = PAGE_BODY_SIZE / StringPage::RECORD_SIZE;
    let owner = Address::new(PageId::new(2), 0);

    let mut addresses = Vec::new();
    for i in 0..capacity {
        let address = page
            .insert(&format!("value-{}", i), owner)
            .unwrap()
            .expect("page has room");
        addresses.push(address);
    }
    assert!(page.insert(&"overflow".to_string(), owner).unwrap().is_none());
    assert_eq!(page.records().unwrap().len(), capacity);

    for address in &addresses {
        page.remove(address.offset).unwrap();
    }
    assert_eq!(page.free_bytes().unwrap(), PAGE_BODY_SIZE);
    assert!(page.records().unwrap().is_empty());
}

#[test]
fn test_integer_page_reuses_released_slot() {
    let mut page = IntegerPage::new(PageId::new(4));
    let owner = Address::new(PageId::new(2), 12);
    let first = page.insert(&10, owner).unwrap().unwrap();
    let second = page.insert(&20, owner).unwrap().unwrap();
    assert_ne!(first, second);

    page.remove(first.offset).unwrap();
    let third = page.insert(&30, owner).unwrap().unwrap();
    assert_eq!(third, first);
    assert_eq!(page.value(third.offset).unwrap(), 30);
    assert_eq!(page.value(second.offset).unwrap(), 20);
}

#[test]
fn test_catalog_page_survives_byte_round_trip() {
    let mut catalog = CatalogPage::new(PageId::new(1));
    let table = TableDescription::new(
        "people",
        PageId::new(2),
        vec![
            AttributeDescription::new("name", PageId::new(3)),
            AttributeDescription::new("age", PageId::new(4)),
        ],
    );
    catalog.insert(&table).unwrap().unwrap();
    catalog.set_next_page(Some(PageId::new(9)));

    let bytes = Box::new(*catalog.data());
    let page = Page::from_bytes(PageId::new(1), bytes).unwrap();
    let catalog = page.as_catalog().unwrap();
    assert_eq!(catalog.next_page(), Some(PageId::new(9)));
    let (_, found) = catalog.find("people").unwrap().unwrap();
    assert_eq!(found, table);
}

#[test]
fn test_catalog_page_holds_widest_table() {
    let attributes: Vec<_> = (0..59)
        .map(|i| AttributeDescription::new(format!("a{}", i), PageId::new(10 + i)))
        .collect();
    let widest = TableDescription::new("wide", PageId::new(2), attributes);
    assert!(widest.record_size() <= PAGE_BODY_SIZE);

    let mut catalog = CatalogPage::new(PageId::new(1));
    assert!(catalog.insert(&widest).unwrap().is_some());

    let mut too_wide = widest.clone();
    too_wide.push_attribute(AttributeDescription::new("a59", PageId::new(99)));
    assert!(catalog.insert(&too_wide).is_err());
}
