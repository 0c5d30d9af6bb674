//! Table behaviour tests for cmw-mem

use cmw_core::RtError;
use cmw_mem::{table_size, Table};

fn items(table: &Table<Vec<u8>>) -> Vec<Vec<u8>> {
    table.iter().map(<[u8]>::to_vec).collect()
}

fn filled(capacity: u32, count: u8) -> Table<Vec<u8>> {
    let mut table = Table::init(vec![0u8; table_size(capacity, 3)], capacity, 3).unwrap();
    for i in 0..count {
        table.push(&[i, i.wrapping_mul(3), 0xEE]).unwrap();
    }
    table
}

#[test]
fn test_capacity_is_exact() {
    let capacity = 5;
    let mut table = filled(capacity, 5);
    assert!(table.is_full());
    assert_eq!(table.push(&[9, 9, 9]), Err(RtError::Failure));

    for _ in 0..capacity {
        table.pop(None).unwrap();
    }
    assert_eq!(table.pop(None), Err(RtError::Failure));

    for i in 0..capacity as u8 {
        table.push(&[i, i, i]).unwrap();
    }
    assert_eq!(table.count(), capacity);
}

#[test]
fn test_insert_then_remove_restores_sequence() {
    for pos in 0..=4 {
        let mut table = filled(6, 4);
        let before = items(&table);

        table.insert(pos, &[0xAB, 0xCD, 0xEF]).unwrap();
        assert_eq!(table.get(pos), Some(&[0xAB, 0xCD, 0xEF][..]));
        assert_eq!(table.count(), 5);

        let mut removed = [0u8; 3];
        table.remove(pos, Some(&mut removed)).unwrap();
        assert_eq!(removed, [0xAB, 0xCD, 0xEF]);
        assert_eq!(items(&table), before, "insert/remove at {pos}");
    }
}

#[test]
fn test_insert_failures() {
    let mut table = filled(3, 2);
    assert_eq!(table.insert(3, &[0, 0, 0]), Err(RtError::Failure));
    table.insert(2, &[1, 1, 1]).unwrap();
    assert_eq!(table.insert(0, &[0, 0, 0]), Err(RtError::Failure));
}

#[test]
fn test_move_bounds() {
    let mut table = filled(4, 2);
    assert_eq!(table.move_item(0, 2), Err(RtError::Failure));
    assert_eq!(table.move_item(2, 0), Err(RtError::Failure));
    table.move_item(1, 0).unwrap();
    assert_eq!(table.get(0), Some(&[1, 3, 0xEE][..]));
}

#[test]
fn test_remove_out_of_bounds() {
    let mut table = filled(4, 2);
    assert_eq!(table.remove(2, None), Err(RtError::Failure));
    assert_eq!(table.count(), 2);
}

#[test]
fn test_item_size_mismatch() {
    let mut table = filled(4, 1);
    assert_eq!(table.push(&[1, 2]), Err(RtError::InvalidInParameter));
    let mut short = [0u8; 2];
    assert_eq!(table.pop(Some(&mut short)), Err(RtError::InvalidOutParameter));
    assert_eq!(table.count(), 1);
}

#[test]
fn test_reserve_claims_slot_in_place() {
    let mut table = filled(2, 1);
    table.reserve().unwrap().copy_from_slice(&[7, 7, 7]);
    assert_eq!(table.get(1), Some(&[7, 7, 7][..]));
    assert!(table.reserve().is_none());
}

#[test]
fn test_clear_and_attach() {
    let mut table = filled(4, 3);
    table.clear().unwrap();
    assert!(table.is_empty());
    table.push(&[5, 5, 5]).unwrap();

    let block = table.into_inner();
    let reopened = Table::attach(&block[..]).unwrap();
    assert_eq!(reopened.count(), 1);
    assert_eq!(reopened.stats().free(), 3);
    assert_eq!(reopened.get(0), Some(&[5, 5, 5][..]));
}
