//! Tests for storage backends
//!
//! These tests verify:
//! - File creation with the bootstrap pages (and refusal without create)
//! - Positional page reads and writes, zero pages past the end
//! - Atomic file replacement leaves no temp file behind
//! - In-memory crash simulation keeps only synced pages
//! - Fault injection fails every operation from the chosen point on

use cowkv::btree::node::PAGE_SIZE;
use cowkv::meta::{Meta, INITIAL_PAGE_COUNT};
use cowkv::storage::{write_file_atomic, FileBackend, InMemoryBackend, StorageBackend};
use cowkv::KvError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn page(fill: u8) -> Vec<u8> {
    vec![fill; PAGE_SIZE]
}

// =============================================================================
// File Backend Tests
// =============================================================================

#[test]
fn test_file_open_creates_bootstrap_pages() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.db");

    let backend = FileBackend::open(&path, true).unwrap();

    assert!(path.exists());
    assert_eq!(backend.path(), path.as_path());
    assert_eq!(backend.page_count().unwrap(), INITIAL_PAGE_COUNT);
    let meta = Meta::recover(&backend.read_page(0).unwrap(), &backend.read_page(1).unwrap());
    assert_eq!(meta.unwrap(), Meta::initial());
}

#[test]
fn test_file_open_missing_without_create_fails() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("absent.db");

    let result = FileBackend::open(&path, false);

    assert!(matches!(result, Err(KvError::Config(_))));
    assert!(!path.exists());
}

#[test]
fn test_file_write_and_read_pages() {
    let temp = TempDir::new().unwrap();
    let backend = FileBackend::open(&temp.path().join("store.db"), true).unwrap();

    backend.write_page(3, &page(0x11)).unwrap();
    backend.write_page(5, &page(0x55)).unwrap();
    backend.sync().unwrap();

    assert_eq!(backend.page_count().unwrap(), 6);
    assert_eq!(backend.read_page(3).unwrap(), page(0x11));
    assert_eq!(backend.read_page(5).unwrap(), page(0x55));
    // the hole between them reads as zeros
    assert_eq!(backend.read_page(4).unwrap(), page(0));
    assert_eq!(backend.read_page(100).unwrap(), page(0));
}

#[test]
fn test_file_rejects_partial_page_write() {
    let temp = TempDir::new().unwrap();
    let backend = FileBackend::open(&temp.path().join("store.db"), true).unwrap();

    let result = backend.write_page(3, &[1, 2, 3]);
    assert!(result.is_err());
}

#[test]
fn test_file_pages_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("store.db");

    {
        let backend = FileBackend::open(&path, true).unwrap();
        backend.write_page(3, &page(0x33)).unwrap();
        backend.sync().unwrap();
    }

    let backend = FileBackend::open(&path, false).unwrap();
    assert_eq!(backend.read_page(3).unwrap(), page(0x33));
}

#[test]
fn test_write_file_atomic_replaces_contents() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("data.bin");

    write_file_atomic(&path, b"first").unwrap();
    write_file_atomic(&path, b"second").unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"second");
    let leftovers: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
        .collect();
    assert!(leftovers.is_empty());
}

// =============================================================================
// In-Memory Backend Tests
// =============================================================================

#[test]
fn test_memory_reads_see_unsynced_writes() {
    let backend = InMemoryBackend::new();

    backend.write_page(4, &page(0x44)).unwrap();

    assert_eq!(backend.read_page(4).unwrap(), page(0x44));
    assert_eq!(backend.page_count().unwrap(), 5);
}

#[test]
fn test_memory_crash_keeps_only_synced_pages() {
    let backend = InMemoryBackend::new();
    backend.write_page(3, &page(1)).unwrap();
    backend.sync().unwrap();
    backend.write_page(3, &page(2)).unwrap();
    backend.write_page(4, &page(3)).unwrap();

    let crashed = backend.crash();

    assert_eq!(crashed.read_page(3).unwrap(), page(1));
    assert_eq!(crashed.read_page(4).unwrap(), page(0));
    assert_eq!(crashed.page_count().unwrap(), 4);
}

#[test]
fn test_memory_fault_injection() {
    let backend = InMemoryBackend::bootstrapped();
    backend.fail_after(2);

    assert!(backend.write_page(3, &page(1)).is_ok());
    assert!(backend.sync().is_ok());
    assert!(matches!(backend.write_page(4, &page(2)), Err(KvError::Io(_))));
    assert!(backend.sync().is_err());

    backend.clear_fault();
    assert!(backend.write_page(4, &page(2)).is_ok());
    assert_eq!(backend.ops(), 5);
}

#[test]
fn test_memory_failed_sync_does_not_persist() {
    let backend = InMemoryBackend::bootstrapped();
    backend.write_page(3, &page(9)).unwrap();
    backend.fail_after(0);

    assert!(backend.sync().is_err());
    assert_eq!(backend.crash().read_page(3).unwrap(), page(0));
}

#[test]
fn test_memory_bootstrapped_holds_initial_meta() {
    let backend = InMemoryBackend::bootstrapped();

    let meta = Meta::recover(&backend.read_page(0).unwrap(), &backend.read_page(1).unwrap());
    assert_eq!(meta.unwrap(), Meta::initial());
    assert_eq!(backend.page_count().unwrap(), INITIAL_PAGE_COUNT);
}
