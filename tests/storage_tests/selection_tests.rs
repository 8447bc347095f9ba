//! Tests for choosing the live file of the .a/.b pair
//!
//! These tests verify:
//! - Fresh pair creation
//! - Higher (tx, minor) wins
//! - Fallback when one file is unreadable
//! - Failure when neither file is usable

use std::fs;
use std::path::Path;

use countstore::error::CountsError;
use countstore::key::{CountsKey, CountsValue};
use countstore::storage::{DurableStore, Slot, StoreFiles, WriterOptions};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn write_version(path: &Path, tx_id: u64, minor_version: u64, node_count: i64) {
    let mut writer =
        DurableStore::new_writer(path, WriterOptions::new(tx_id, minor_version)).unwrap();
    writer
        .add(CountsKey::node(1), CountsValue::count(node_count))
        .unwrap();
    writer.finish().unwrap();
}

fn setup_files() -> (TempDir, StoreFiles) {
    let temp_dir = TempDir::new().unwrap();
    let files = StoreFiles::new(temp_dir.path(), "counts.db");
    (temp_dir, files)
}

// =============================================================================
// Creation Tests
// =============================================================================

#[test]
fn test_fresh_pair_created() {
    let temp_dir = TempDir::new().unwrap();
    let files = StoreFiles::new(temp_dir.path().join("nested"), "counts.db");

    let selection = files.open_or_create(false, 1).unwrap();

    assert!(selection.created);
    assert_eq!(selection.slot, Slot::A);
    assert_eq!(selection.store.header().version(), (0, 1));

    let other = DurableStore::open(&files.path(Slot::B)).unwrap();
    assert_eq!(other.header().version(), (0, 0));
}

#[test]
fn test_read_only_never_creates() {
    let (_dir, files) = setup_files();

    let err = files.open_or_create(true, 1).unwrap_err();
    assert!(matches!(err, CountsError::ReadOnly(_)), "{}", err);
    assert!(!files.any_exists());
}

#[test]
fn test_existing_pair_not_recreated() {
    let (_dir, files) = setup_files();
    files.open_or_create(false, 1).unwrap();

    let selection = files.open_or_create(false, 1).unwrap();
    assert!(!selection.created);
    assert_eq!(selection.slot, Slot::A);
}

// =============================================================================
// Version Selection Tests
// =============================================================================

#[test]
fn test_higher_minor_wins_on_same_tx() {
    let (_dir, files) = setup_files();
    write_version(&files.path(Slot::A), 10, 1, 1);
    write_version(&files.path(Slot::B), 10, 2, 2);

    let selection = files.open_or_create(false, 1).unwrap();
    assert_eq!(selection.slot, Slot::B);
    assert_eq!(selection.store.get(&CountsKey::node(1)).unwrap().second, 2);
}

#[test]
fn test_higher_tx_wins_over_higher_minor() {
    let (_dir, files) = setup_files();
    write_version(&files.path(Slot::A), 10, 1, 1);
    write_version(&files.path(Slot::B), 9, 7, 2);

    let selection = files.open_or_create(false, 1).unwrap();
    assert_eq!(selection.slot, Slot::A);
    assert_eq!(selection.store.tx_id(), 10);
}

#[test]
fn test_corrupt_newer_file_falls_back() {
    let (_dir, files) = setup_files();
    write_version(&files.path(Slot::A), 10, 1, 1);
    write_version(&files.path(Slot::B), 11, 1, 2);
    fs::write(files.path(Slot::B), b"not a counts file").unwrap();

    let selection = files.open_or_create(false, 1).unwrap();
    assert_eq!(selection.slot, Slot::A);
    assert_eq!(selection.store.tx_id(), 10);
}

#[test]
fn test_missing_file_falls_back() {
    let (_dir, files) = setup_files();
    write_version(&files.path(Slot::B), 3, 1, 1);

    let selection = files.open_or_create(false, 1).unwrap();
    assert!(!selection.created);
    assert_eq!(selection.slot, Slot::B);
}

#[test]
fn test_no_valid_file_is_an_error() {
    let (_dir, files) = setup_files();
    fs::write(files.path(Slot::A), b"garbage").unwrap();
    fs::write(files.path(Slot::B), vec![0u8; 64]).unwrap();

    let err = files.open_or_create(false, 1).unwrap_err();
    assert!(matches!(err, CountsError::NoValidStoreFile { .. }), "{}", err);
}

#[test]
fn test_stale_temp_file_removed_on_open() {
    let (_dir, files) = setup_files();
    files.open_or_create(false, 1).unwrap();

    let temp = files.dir().join("counts.db.b.tmp");
    fs::write(&temp, b"half written").unwrap();

    files.open_or_create(false, 1).unwrap();
    assert!(!temp.exists());
}
