//! Storage Module
//!
//! Page-granular storage backends behind one trait.
//!
//! ## Responsibilities
//! - Read and write whole pages by page number
//! - Make issued writes durable on `sync`
//! - Create a store file atomically (temp file + rename)
//!
//! ## File Format
//! ```text
//! ┌────────────┬────────────┬────────────────┬─────────────────────────────┐
//! │ page 0     │ page 1     │ page 2         │ page 3 ...                  │
//! │ meta slot  │ meta slot  │ free-list node │ tree and free-list pages    │
//! └────────────┴────────────┴────────────────┴─────────────────────────────┘
//!   4096 bytes each, page N at byte offset N × 4096
//! ```
//!
//! Backends do no caching and no ordering: the commit protocol decides when
//! to sync.

mod file;
mod memory;

pub use file::{sync_dir, write_file_atomic, FileBackend};
pub use memory::InMemoryBackend;

use crate::btree::node::PAGE_SIZE;
use crate::error::Result;
use crate::meta::{Meta, INITIAL_PAGE_COUNT};

/// Storage backend trait for page I/O
///
/// All methods take `&self` so readers and the single writer can share a
/// backend across threads.
pub trait StorageBackend: Send + Sync {
    /// Read page `ptr` (zero-filled if never written)
    fn read_page(&self, ptr: u64) -> Result<Vec<u8>>;

    /// Write a full page image at `ptr`
    fn write_page(&self, ptr: u64, data: &[u8]) -> Result<()>;

    /// Flush all issued writes to stable storage
    fn sync(&self) -> Result<()>;

    /// Number of whole pages currently stored
    fn page_count(&self) -> Result<u64>;

    /// Byte offset of a page
    fn page_offset(&self, ptr: u64) -> u64 {
        ptr * PAGE_SIZE as u64
    }
}

/// Page images of a freshly created store, in page order
///
/// Slot 0 blank, slot 1 holding the initial meta (txid 1), then the first
/// free-list node.
pub fn bootstrap_pages() -> Vec<Vec<u8>> {
    let meta = Meta::initial();
    let mut pages = vec![vec![0u8; PAGE_SIZE]; INITIAL_PAGE_COUNT as usize];
    pages[meta.slot() as usize] = meta.encode();
    pages
}
