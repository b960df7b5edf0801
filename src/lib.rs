//! # cowkv
//!
//! An embedded, single-file key-value store with:
//! - A copy-on-write B+tree (pages are never overwritten in place)
//! - Crash-safe commits through a double-buffered meta page
//! - Page reuse through a persistent free list
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                                │
//! │        get / scan (readers)      set / del (one writer)      │
//! └───────────┬───────────────────────────────┬─────────────────┘
//!             │ Snapshot                      │ Txn
//!             ▼                               ▼
//!      ┌─────────────┐                 ┌─────────────┐
//!      │    BTree    │◄────────────────│    Pager    │──► FreeList
//!      │  (PageRead) │   (PageAlloc)   │  (staging)  │
//!      └──────┬──────┘                 └──────┬──────┘
//!             │                               │ commit
//!             ▼                               ▼
//!      ┌─────────────────────────────────────────────┐
//!      │   StorageBackend (file / in-memory)         │
//!      │   [meta 0][meta 1][free 2][pages 3..]       │
//!      └─────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod btree;
pub mod freelist;
pub mod meta;
mod pager;
pub mod storage;
pub mod store;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::{Config, SyncMode};
pub use store::{Scan, Store, StoreStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cowkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
