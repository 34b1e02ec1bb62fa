use super::*;
use buffer::BufferPool;
use common::{PageId, RecordId};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tempfile::tempdir;

fn rid(page: u32, slot: u16) -> RecordId {
    RecordId::new(PageId(page), slot)
}

fn pool_in(dir: &std::path::Path, frames: usize) -> BufferPool {
    BufferPool::new(dir, frames).unwrap()
}

#[test]
fn insert_and_point_search() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    tree.insert(&mut pool, "Casablanca", rid(0, 0)).unwrap();
    tree.insert(&mut pool, "Alien", rid(0, 1)).unwrap();

    assert_eq!(tree.search(&mut pool, "Alien").unwrap(), vec![rid(0, 1)]);
    assert_eq!(tree.search(&mut pool, "Casablanca").unwrap(), vec![rid(0, 0)]);
    assert_eq!(tree.search(&mut pool, "Zardoz").unwrap(), vec![]);
}

#[test]
fn duplicate_keys_collapse_into_one_rid_list() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    tree.insert(&mut pool, "Remake", rid(0, 0)).unwrap();
    tree.insert(&mut pool, "Remake", rid(1, 4)).unwrap();
    tree.insert(&mut pool, "Remake", rid(2, 2)).unwrap();

    // Insertion order within the key is preserved.
    assert_eq!(
        tree.search(&mut pool, "Remake").unwrap(),
        vec![rid(0, 0), rid(1, 4), rid(2, 2)]
    );
}

#[test]
fn range_search_is_inclusive_on_both_ends() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    for (i, key) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        tree.insert(&mut pool, key, rid(i as u32, 0)).unwrap();
    }

    let hits = tree.range_search(&mut pool, "b", "d").unwrap();
    assert_eq!(hits, vec![rid(1, 0), rid(2, 0), rid(3, 0)]);
}

#[test]
fn range_search_with_inverted_bounds_is_empty() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex = BTreeIndex::create(&mut pool, "idx.bin").unwrap();
    tree.insert(&mut pool, "m", rid(0, 0)).unwrap();

    assert!(tree.range_search(&mut pool, "z", "a").unwrap().is_empty());
}

#[test]
fn range_search_with_equal_bounds_is_a_point_lookup() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex = BTreeIndex::create(&mut pool, "idx.bin").unwrap();
    tree.insert(&mut pool, "m", rid(3, 3)).unwrap();
    tree.insert(&mut pool, "n", rid(4, 4)).unwrap();

    assert_eq!(tree.range_search(&mut pool, "m", "m").unwrap(), vec![rid(3, 3)]);
}

#[test]
fn splits_keep_every_key_reachable() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    // Tiny order so a few hundred keys force multi-level splits.
    let mut tree: BTreeIndex<4> = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    for i in 0..300u32 {
        tree.insert(&mut pool, &format!("key{i:04}"), rid(i, 0)).unwrap();
    }
    for i in 0..300u32 {
        assert_eq!(
            tree.search(&mut pool, &format!("key{i:04}")).unwrap(),
            vec![rid(i, 0)],
            "key{i:04} lost after splits"
        );
    }
}

#[test]
fn full_range_enumerates_in_key_order_after_splits() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex<4> = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    // Insert in reverse; the page component of each RID encodes the key's
    // sorted position so the output order is checkable.
    for i in (0..200u32).rev() {
        tree.insert(&mut pool, &format!("key{i:04}"), rid(i, 0)).unwrap();
    }

    let hits = tree.range_search(&mut pool, "key0000", "key9999").unwrap();
    assert_eq!(hits.len(), 200);
    let expected: Vec<RecordId> = (0..200u32).map(|i| rid(i, 0)).collect();
    assert_eq!(hits, expected);
}

#[test]
fn bulk_load_sorted_input_round_trips() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex<4> = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    for i in 0..150u32 {
        tree.bulk_insert(&mut pool, &format!("key{i:04}"), rid(i, 0)).unwrap();
    }

    let hits = tree.range_search(&mut pool, "key0000", "key9999").unwrap();
    let expected: Vec<RecordId> = (0..150u32).map(|i| rid(i, 0)).collect();
    assert_eq!(hits, expected);
}

#[test]
fn bulk_load_accepts_equal_keys() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    tree.bulk_insert(&mut pool, "same", rid(0, 0)).unwrap();
    tree.bulk_insert(&mut pool, "same", rid(0, 1)).unwrap();
    assert_eq!(tree.search(&mut pool, "same").unwrap(), vec![rid(0, 0), rid(0, 1)]);
}

#[test]
fn bulk_load_rejects_decreasing_keys() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    let mut tree: BTreeIndex = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    tree.bulk_insert(&mut pool, "m", rid(0, 0)).unwrap();
    let err = tree.bulk_insert(&mut pool, "a", rid(0, 1)).unwrap_err();
    assert!(matches!(err, DbError::Index(_)));
}

#[test]
fn reopen_finds_relocated_root() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    {
        let mut tree: BTreeIndex<4> = BTreeIndex::create(&mut pool, "idx.bin").unwrap();
        for i in 0..100u32 {
            tree.insert(&mut pool, &format!("key{i:04}"), rid(i, 0)).unwrap();
        }
        tree.flush(&mut pool).unwrap();
    }

    // A fresh pool and tree handle: the root has moved off page 0 by now,
    // so open() must climb parent links to it.
    let mut pool2 = pool_in(dir.path(), 8);
    let tree: BTreeIndex<4> = BTreeIndex::open(&mut pool2, "idx.bin").unwrap();
    for i in 0..100u32 {
        assert_eq!(
            tree.search(&mut pool2, &format!("key{i:04}")).unwrap(),
            vec![rid(i, 0)]
        );
    }
}

#[test]
fn open_or_create_builds_then_reopens() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 8);
    {
        let mut tree: BTreeIndex = BTreeIndex::open_or_create(&mut pool, "idx.bin").unwrap();
        tree.insert(&mut pool, "k", rid(1, 1)).unwrap();
        tree.flush(&mut pool).unwrap();
    }
    let tree: BTreeIndex = BTreeIndex::open_or_create(&mut pool, "idx.bin").unwrap();
    assert_eq!(tree.search(&mut pool, "k").unwrap(), vec![rid(1, 1)]);
}

#[test]
fn open_missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let mut pool = pool_in(dir.path(), 4);
    let err = BTreeIndex::<200>::open(&mut pool, "no-such.bin").unwrap_err();
    assert!(matches!(err, DbError::FileMissing(_)));
}

#[test]
fn survives_buffer_pressure() {
    let dir = tempdir().unwrap();
    // Four frames for a tree that will span dozens of pages.
    let mut pool = pool_in(dir.path(), 4);
    let mut tree: BTreeIndex<4> = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

    for i in 0..500u32 {
        tree.insert(&mut pool, &format!("key{i:05}"), rid(i, (i % 7) as u16))
            .unwrap();
    }
    let hits = tree.range_search(&mut pool, "key00000", "key99999").unwrap();
    assert_eq!(hits.len(), 500);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_inserted_pair_is_found(keys in proptest::collection::vec("[a-z]{1,12}", 1..120)) {
        let dir = tempdir().unwrap();
        let mut pool = pool_in(dir.path(), 8);
        let mut tree: BTreeIndex<8> = BTreeIndex::create(&mut pool, "idx.bin").unwrap();

        for (i, key) in keys.iter().enumerate() {
            tree.insert(&mut pool, key, rid(i as u32, 0)).unwrap();
        }
        for (i, key) in keys.iter().enumerate() {
            let hits = tree.search(&mut pool, key).unwrap();
            prop_assert!(hits.contains(&rid(i as u32, 0)), "{key} lost rid {i}");
        }

        let total = tree.range_search(&mut pool, "", "\u{10FFFF}").unwrap();
        prop_assert_eq!(total.len(), keys.len());
    }
}
