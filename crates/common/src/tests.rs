use super::*;

#[test]
fn page_id_offset_is_page_aligned() {
    assert_eq!(PageId(0).offset(), 0);
    assert_eq!(PageId(1).offset(), 4096);
    assert_eq!(PageId(1000).offset(), 1000 * 4096);
}

#[test]
fn record_ids_order_by_page_then_slot() {
    let a = RecordId::new(PageId(0), 5);
    let b = RecordId::new(PageId(1), 0);
    let c = RecordId::new(PageId(1), 3);
    assert!(a < b);
    assert!(b < c);
}

#[test]
fn config_defaults() {
    let config = Config::default();
    assert_eq!(config.buffer_pool_frames, 16);
    assert_eq!(config.data_dir, std::path::PathBuf::from("."));
}

#[test]
fn config_builder_overrides() {
    let config = Config::builder().buffer_pool_frames(4).build();
    assert_eq!(config.buffer_pool_frames, 4);
}

#[test]
fn range_lower_bound_is_lexical() {
    assert!(range_contains("B", "Z", "Brazil"));
    assert!(!range_contains("B", "Z", "Alien"));
}

#[test]
fn range_upper_bound_admits_by_prefix() {
    // hi = "A" admits every title starting with "A".
    assert!(range_contains("A", "A", "A Movie"));
    assert!(range_contains("A", "C", "Casablanca"));
    assert!(!range_contains("A", "C", "Dune"));
    assert!(!range_contains("Z", "Z", "A Movie"));
}

#[test]
fn range_with_key_shorter_than_bounds() {
    assert!(range_contains("A", "AB", "A"));
    assert!(!range_contains("AA", "AB", "A"));
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
    let err: DbError = io.into();
    assert!(matches!(err, DbError::Io(_)));
}
