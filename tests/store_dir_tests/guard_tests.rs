//! Tests for StoreDirectory
//!
//! These tests verify:
//! - Directory creation and NotADirectory detection
//! - Format check outcomes (matched / unverified / wiped)
//! - Persist-once semantics of the engine config
//! - Partition id discovery and size accounting

use std::fs;
use std::path::PathBuf;

use partkv::store_dir::{FormatCheck, PersistedEngineConfig, StoreDirectory};
use partkv::{PartKvError, TableFormat};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_store_dir() -> (TempDir, StoreDirectory) {
    let temp_dir = TempDir::new().unwrap();
    let store_dir = StoreDirectory::resolve(temp_dir.path(), "orders").unwrap();
    (temp_dir, store_dir)
}

fn write_config(store_dir: &StoreDirectory, format: TableFormat) {
    store_dir.ensure_exists().unwrap();
    store_dir
        .persist_config_once(&PersistedEngineConfig::new(format))
        .unwrap();
}

fn touch_partition(store_dir: &StoreDirectory, partition_id: i32, bytes: usize) -> PathBuf {
    let dir = store_dir.partition_dir(partition_id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("data.tbl"), vec![7u8; bytes]).unwrap();
    dir
}

// =============================================================================
// Resolve / Create Tests
// =============================================================================

#[test]
fn test_resolve_is_pure() {
    let (temp, store_dir) = setup_store_dir();

    assert_eq!(store_dir.path(), temp.path().join("orders"));
    assert_eq!(store_dir.store_name(), "orders");
    assert!(!store_dir.exists());
}

#[test]
fn test_ensure_exists_is_idempotent() {
    let (_temp, store_dir) = setup_store_dir();

    assert!(store_dir.ensure_exists().unwrap());
    assert!(!store_dir.ensure_exists().unwrap());
    assert!(store_dir.path().is_dir());
}

#[test]
fn test_ensure_exists_rejects_file() {
    let (_temp, store_dir) = setup_store_dir();
    fs::write(store_dir.path(), b"file").unwrap();

    assert!(matches!(
        store_dir.ensure_exists(),
        Err(PartKvError::NotADirectory(_))
    ));
    assert!(matches!(
        store_dir.list_persisted_partition_ids(),
        Err(PartKvError::NotADirectory(_))
    ));
}

#[test]
fn test_engine_config_lives_in_metadata_partition() {
    let (temp, store_dir) = setup_store_dir();

    assert_eq!(
        store_dir.engine_config_path(),
        temp.path().join("orders").join("orders_-1").join("engineConfig")
    );
}

// =============================================================================
// Format Check Tests
// =============================================================================

#[test]
fn test_check_without_config_is_unverified() {
    let (_temp, store_dir) = setup_store_dir();
    store_dir.ensure_exists().unwrap();
    touch_partition(&store_dir, 0, 16);

    let check = store_dir
        .check_and_reconcile_format(TableFormat::PlainTable)
        .unwrap();

    assert_eq!(check, FormatCheck::Unverified);
    assert_eq!(store_dir.size_in_bytes(), 16);
}

#[test]
fn test_check_matching_format() {
    let (_temp, store_dir) = setup_store_dir();
    write_config(&store_dir, TableFormat::BlockBasedTable);
    touch_partition(&store_dir, 0, 16);

    let check = store_dir
        .check_and_reconcile_format(TableFormat::BlockBasedTable)
        .unwrap();

    assert_eq!(check, FormatCheck::Matched);
    assert!(store_dir.partition_dir(0).exists());
}

#[test]
fn test_check_conflict_wipes_directory() {
    let (_temp, store_dir) = setup_store_dir();
    write_config(&store_dir, TableFormat::PlainTable);
    touch_partition(&store_dir, 0, 128);
    touch_partition(&store_dir, 1, 128);

    let check = store_dir
        .check_and_reconcile_format(TableFormat::BlockBasedTable)
        .unwrap();

    assert_eq!(
        check,
        FormatCheck::Wiped {
            persisted: TableFormat::PlainTable
        }
    );
    assert!(store_dir.path().is_dir());
    assert_eq!(store_dir.size_in_bytes(), 0);
    assert!(store_dir.list_persisted_partition_ids().unwrap().is_empty());
    assert!(store_dir.read_engine_config().unwrap().is_none());
}

#[test]
fn test_check_torn_config_is_unverified() {
    let (_temp, store_dir) = setup_store_dir();
    store_dir.ensure_exists().unwrap();
    fs::create_dir_all(store_dir.partition_dir(-1)).unwrap();
    fs::write(store_dir.engine_config_path(), [0xFFu8, 0xFE, 0x00]).unwrap();

    let check = store_dir
        .check_and_reconcile_format(TableFormat::PlainTable)
        .unwrap();

    assert_eq!(check, FormatCheck::Unverified);
}

// =============================================================================
// Persist Once Tests
// =============================================================================

#[test]
fn test_persist_config_once_first_writer_wins() {
    let (_temp, store_dir) = setup_store_dir();
    store_dir.ensure_exists().unwrap();

    let first = PersistedEngineConfig::new(TableFormat::PlainTable);
    let mut second = PersistedEngineConfig::new(TableFormat::BlockBasedTable);
    second.set("extra", "1");

    assert!(store_dir.persist_config_once(&first).unwrap());
    let written = fs::read_to_string(store_dir.engine_config_path()).unwrap();

    assert!(!store_dir.persist_config_once(&second).unwrap());
    let after = fs::read_to_string(store_dir.engine_config_path()).unwrap();

    assert_eq!(written, after);
    assert_eq!(store_dir.read_engine_config().unwrap(), Some(first));
}

#[test]
fn test_persist_never_overwrites_unreadable_file() {
    let (_temp, store_dir) = setup_store_dir();
    store_dir.ensure_exists().unwrap();
    fs::create_dir_all(store_dir.partition_dir(-1)).unwrap();
    fs::write(store_dir.engine_config_path(), b"garbage").unwrap();

    let wrote = store_dir
        .persist_config_once(&PersistedEngineConfig::new(TableFormat::PlainTable))
        .unwrap();

    assert!(!wrote);
    assert_eq!(fs::read(store_dir.engine_config_path()).unwrap(), b"garbage");
}

// =============================================================================
// Discovery / Size Tests
// =============================================================================

#[test]
fn test_list_ids_on_missing_directory() {
    let (_temp, store_dir) = setup_store_dir();

    assert!(store_dir.list_persisted_partition_ids().unwrap().is_empty());
}

#[test]
fn test_list_ids_skips_unrecognized_entries() {
    let (_temp, store_dir) = setup_store_dir();
    store_dir.ensure_exists().unwrap();
    for id in [-1, 0, 5] {
        touch_partition(&store_dir, id, 1);
    }
    fs::create_dir(store_dir.path().join("orders_tmp")).unwrap();
    fs::create_dir(store_dir.path().join("customers_1")).unwrap();
    fs::write(store_dir.path().join("orders_9"), b"a file, not a partition").unwrap();

    let ids: Vec<i32> = store_dir
        .list_persisted_partition_ids()
        .unwrap()
        .into_iter()
        .collect();

    assert_eq!(ids, vec![-1, 0, 5]);
}

#[test]
fn test_size_of_missing_directory_is_zero() {
    let (_temp, store_dir) = setup_store_dir();

    assert_eq!(store_dir.size_in_bytes(), 0);
}

#[test]
fn test_size_is_recursive() {
    let (_temp, store_dir) = setup_store_dir();
    store_dir.ensure_exists().unwrap();
    touch_partition(&store_dir, 0, 100);
    let nested = touch_partition(&store_dir, 1, 50).join("nested");
    fs::create_dir_all(&nested).unwrap();
    fs::write(nested.join("blob"), vec![0u8; 25]).unwrap();

    assert_eq!(store_dir.size_in_bytes(), 175);
}

#[test]
fn test_remove_all() {
    let (_temp, store_dir) = setup_store_dir();
    store_dir.ensure_exists().unwrap();
    touch_partition(&store_dir, 0, 10);

    assert!(store_dir.remove_all().unwrap());
    assert!(!store_dir.exists());
    assert!(!store_dir.remove_all().unwrap());
}
