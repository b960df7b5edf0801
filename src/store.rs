//! Store Module
//!
//! The store handle that ties the tree, the free list and the meta page to a
//! storage backend.
//!
//! ## Responsibilities
//! - Recover the current meta on open (or bootstrap a new store)
//! - Run each `set`/`del` as one copy-on-write transaction
//! - Commit crash-safely: data pages, fsync, meta page, fsync, publish
//! - Serve concurrent lookups and scans against the published meta

use std::ops::{Bound, RangeBounds};
use std::path::Path;

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use crate::btree::{BTree, Cursor, TreeStats};
use crate::config::{Config, SyncMode};
use crate::error::{KvError, Result};
use crate::freelist::FREELIST_CAP;
use crate::meta::{Meta, META_SLOTS};
use crate::pager::{Snapshot, Txn};
use crate::storage::{bootstrap_pages, FileBackend, StorageBackend};

/// Writer-side state, guarded by the writer lock
struct WriterState {
    /// A commit failed after touching the next meta slot; it must be
    /// overwritten with the committed meta before any page is reused
    meta_unsettled: bool,
}

/// Snapshot of the committed store state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Transaction id of the published meta
    pub txid: u64,
    /// Root page (0 when empty)
    pub root: u64,
    /// Pages in use, meta slots included
    pub page_count: u64,
    /// Pages waiting in the free list
    pub free_pages: u64,
}

/// An embedded key-value store in a single file
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (set/del): serialized by `writer`
///   - The transaction is built against a copy of the published meta
///   - Pages are written while readers keep reading the old tree
///   - Publishing the new meta takes the `meta` write guard briefly
///
/// - **Reads** (get/scan): hold the `meta` read guard for their duration
///   - Every page they can reach stays untouched until they finish
///   - Guards are taken recursively, so a read nested inside a live [`Scan`]
///     never queues behind a writer waiting on that scan
///   - A [`Scan`] blocks publishing until dropped; do not write from the
///     thread holding one
pub struct Store<B = FileBackend> {
    backend: B,

    /// Last committed meta
    meta: RwLock<Meta>,

    /// Serializes write transactions
    writer: Mutex<WriterState>,

    sync_mode: SyncMode,
}

impl Store<FileBackend> {
    /// Open or create a store file with the given config
    pub fn open(config: Config) -> Result<Self> {
        let backend = FileBackend::open(&config.path, config.create_if_missing)?;
        Self::with_backend(backend, &config)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses the default config with the specified store file
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().path(path).build())
    }
}

impl<B: StorageBackend> Store<B> {
    /// Open a store on an arbitrary backend
    ///
    /// On startup:
    /// 1. Bootstrap an empty backend (if allowed)
    /// 2. Recover the meta from the two slots
    /// 3. Check the backend holds every page the meta claims
    pub fn with_backend(backend: B, config: &Config) -> Result<Self> {
        // Step 1: Bootstrap an empty backend
        if backend.page_count()? == 0 {
            if !config.create_if_missing {
                return Err(KvError::Config(
                    "backend holds no store and create_if_missing is off".to_string(),
                ));
            }
            for (ptr, page) in bootstrap_pages().iter().enumerate() {
                backend.write_page(ptr as u64, page)?;
            }
            backend.sync()?;
            tracing::info!("Bootstrapped empty store");
        }

        // Step 2: Recover the current meta
        let meta = Meta::recover(&backend.read_page(0)?, &backend.read_page(1)?)?;

        // Step 3: A short backend means lost writes
        let stored = backend.page_count()?;
        if stored < meta.page_count {
            return Err(KvError::Corruption(format!(
                "store holds {} pages but meta {} expects {}",
                stored, meta.txid, meta.page_count
            )));
        }

        tracing::info!(
            "Opened store: txid={}, root={}, pages={}, free={}",
            meta.txid,
            meta.root,
            meta.page_count,
            meta.tail_seq - meta.head_seq
        );

        Ok(Self {
            backend,
            meta: RwLock::new(meta),
            writer: Mutex::new(WriterState {
                meta_unsettled: false,
            }),
            sync_mode: config.sync_mode,
        })
    }

    /// Get a value by key
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let meta = self.meta.read_recursive();
        let snapshot = Snapshot::new(&self.backend, &meta);
        BTree::new(meta.root).get(&snapshot, key)
    }

    /// Insert or update a key
    ///
    /// Setting a key to the value it already holds commits nothing.
    pub fn set(&self, key: &[u8], val: &[u8]) -> Result<()> {
        self.write(|tree, txn| tree.insert(txn, key, val))?;
        Ok(())
    }

    /// Delete a key, returning whether it was present
    pub fn del(&self, key: &[u8]) -> Result<bool> {
        self.write(|tree, txn| tree.delete(txn, key))
    }

    /// Iterate over the keys in `range`, in order
    ///
    /// ```ignore
    /// for entry in store.scan(&b"a"[..]..&b"c"[..])? {
    ///     let (key, val) = entry?;
    /// }
    /// ```
    pub fn scan<K, R>(&self, range: R) -> Result<Scan<'_, B>>
    where
        K: AsRef<[u8]>,
        R: RangeBounds<K>,
    {
        let owned = |bound: Bound<&K>| match bound {
            Bound::Included(k) => Bound::Included(k.as_ref().to_vec()),
            Bound::Excluded(k) => Bound::Excluded(k.as_ref().to_vec()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let start = owned(range.start_bound());
        let end = owned(range.end_bound());

        let meta = self.meta.read_recursive();
        let snapshot = Snapshot::new(&self.backend, &meta);
        let tree = BTree::new(meta.root);
        let cursor = match &start {
            Bound::Included(k) | Bound::Excluded(k) => tree.seek(snapshot, k)?,
            Bound::Unbounded => tree.first(snapshot)?,
        };
        let skip = match start {
            Bound::Excluded(k) => Some(k),
            _ => None,
        };

        Ok(Scan {
            _meta: meta,
            cursor,
            skip,
            end,
            done: false,
        })
    }

    /// Iterate over every key in order
    pub fn iter(&self) -> Result<Scan<'_, B>> {
        self.scan::<&[u8], _>(..)
    }

    /// Check the tree invariants and the page accounting
    ///
    /// Every page past the meta slots is exactly one of: a tree node, a
    /// free-list node, or a free-list item.
    pub fn verify(&self) -> Result<TreeStats> {
        let meta = self.meta.read_recursive();
        let snapshot = Snapshot::new(&self.backend, &meta);
        let stats = BTree::new(meta.root).verify(&snapshot)?;

        let cap = FREELIST_CAP as u64;
        let free_nodes = meta.tail_seq / cap - meta.head_seq / cap + 1;
        let free_items = meta.tail_seq - meta.head_seq;
        let tree_pages = (stats.internal_nodes + stats.leaves) as u64;
        let accounted = META_SLOTS + tree_pages + free_nodes + free_items;
        if accounted != meta.page_count {
            return Err(KvError::Corruption(format!(
                "page accounting: {} tree + {} free-list nodes + {} free items != {} pages",
                tree_pages,
                free_nodes,
                free_items,
                meta.page_count - META_SLOTS
            )));
        }
        Ok(stats)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Committed store state
    pub fn stats(&self) -> StoreStats {
        let meta = self.meta.read_recursive();
        StoreStats {
            txid: meta.txid,
            root: meta.root,
            page_count: meta.page_count,
            free_pages: meta.tail_seq - meta.head_seq,
        }
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.meta.read_recursive().root == 0
    }

    /// The underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Run `op` as one transaction and commit it if it changed the tree
    fn write<F>(&self, op: F) -> Result<bool>
    where
        F: FnOnce(&mut BTree, &mut Txn<'_, B>) -> Result<bool>,
    {
        let mut state = self.writer.lock();
        let committed = *self.meta.read();

        let mut txn = Txn::begin(&self.backend, &committed);
        let mut tree = BTree::new(committed.root);
        if !op(&mut tree, &mut txn)? {
            return Ok(false);
        }

        let next = txn.next_meta(&committed, tree.root());
        if let Err(e) = self.commit(&mut state, &txn, &committed, &next) {
            tracing::warn!("Commit of txid {} failed: {}", next.txid, e);
            return Err(e);
        }
        Ok(true)
    }

    /// Make the transaction durable, then publish `next`
    ///
    /// Steps:
    /// 1. Settle the meta slot a failed commit may have left behind
    /// 2. Write staged pages
    /// 3. fsync
    /// 4. Write the new meta into its slot
    /// 5. fsync
    /// 6. Publish
    fn commit(
        &self,
        state: &mut WriterState,
        txn: &Txn<'_, B>,
        committed: &Meta,
        next: &Meta,
    ) -> Result<()> {
        // Step 1: A failed commit may have left a valid newer meta in the
        // slot we write next; it must not survive a crash in step 2
        if state.meta_unsettled {
            self.backend.write_page(next.slot(), &committed.encode())?;
            self.sync()?;
            state.meta_unsettled = false;
        }

        // Step 2-3: Data pages first, durable before the meta points at them
        txn.pager().write_staged()?;
        self.sync()?;

        // Step 4-5: The meta write is the commit point
        state.meta_unsettled = true;
        self.backend.write_page(next.slot(), &next.encode())?;
        self.sync()?;
        state.meta_unsettled = false;

        // Step 6: Publish
        *self.meta.write() = *next;

        tracing::debug!(
            "Committed txid {}: root={}, pages={}, staged={}",
            next.txid,
            next.root,
            next.page_count,
            txn.pager().staged()
        );
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        match self.sync_mode {
            SyncMode::EveryCommit => self.backend.sync(),
            SyncMode::Never => Ok(()),
        }
    }
}

/// Ordered iterator over a key range
///
/// Holds the published meta's read guard, so the tree it walks stays
/// intact until the scan is dropped.
pub struct Scan<'a, B: StorageBackend> {
    _meta: RwLockReadGuard<'a, Meta>,
    cursor: Cursor<Snapshot<'a, B>>,
    skip: Option<Vec<u8>>,
    end: Bound<Vec<u8>>,
    done: bool,
}

impl<B: StorageBackend> Scan<'_, B> {
    fn past_end(&self, key: &[u8]) -> bool {
        match &self.end {
            Bound::Included(end) => key > end.as_slice(),
            Bound::Excluded(end) => key >= end.as_slice(),
            Bound::Unbounded => false,
        }
    }
}

impl<B: StorageBackend> Iterator for Scan<'_, B> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let (key, val) = match self.cursor.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if let Some(skip) = self.skip.take() {
                if key == skip {
                    continue;
                }
            }
            if self.past_end(&key) {
                self.done = true;
                return None;
            }
            return Some(Ok((key, val)));
        }
    }
}
