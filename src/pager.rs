//! Pager Module
//!
//! Page views a transaction or a reader works through.
//!
//! ## Responsibilities
//! - Stage page writes of one transaction in memory until commit
//! - Serve reads from staged pages first, then the backend
//! - Hand out pages from the free list before growing the file
//! - Bounds-check every page number against the committed page count
//!
//! ```text
//!   Txn ──alloc──► FreeList::pop_head ──► staged at reused ptr
//!    │                    └─ empty ────► Pager::append (ptr = page_count)
//!    └──del────► FreeList::push_tail ──► Pager::page_mut(tail node)
//! ```

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::btree::node::PAGE_SIZE;
use crate::btree::{Node, PageAlloc, PageRead};
use crate::error::{KvError, Result};
use crate::freelist::{FreeList, FreeListPages};
use crate::meta::{Meta, META_SLOTS};
use crate::storage::StorageBackend;

fn out_of_bounds(ptr: u64, limit: u64) -> KvError {
    KvError::Corruption(format!(
        "page {} out of bounds (valid range {}..{})",
        ptr, META_SLOTS, limit
    ))
}

/// Staged page writes of one transaction
pub(crate) struct Pager<'b, B> {
    backend: &'b B,

    /// Page count of the committed meta
    flushed: u64,

    /// Pages appended past `flushed` by this transaction
    nappend: u64,

    /// Pages to write on commit, by page number
    updates: BTreeMap<u64, Vec<u8>>,
}

impl<'b, B: StorageBackend> Pager<'b, B> {
    pub(crate) fn new(backend: &'b B, page_count: u64) -> Self {
        Self {
            backend,
            flushed: page_count,
            nappend: 0,
            updates: BTreeMap::new(),
        }
    }

    /// Page count once this transaction commits
    pub(crate) fn page_count(&self) -> u64 {
        self.flushed + self.nappend
    }

    /// Number of staged pages
    pub(crate) fn staged(&self) -> usize {
        self.updates.len()
    }

    fn check(&self, ptr: u64) -> Result<()> {
        if ptr < META_SLOTS || ptr >= self.page_count() {
            return Err(out_of_bounds(ptr, self.page_count()));
        }
        Ok(())
    }

    /// Stage a full page image at an existing page number
    pub(crate) fn stage(&mut self, ptr: u64, page: Vec<u8>) -> Result<()> {
        self.check(ptr)?;
        self.updates.insert(ptr, page);
        Ok(())
    }

    /// Write every staged page to the backend in page order
    pub(crate) fn write_staged(&self) -> Result<()> {
        for (ptr, page) in &self.updates {
            self.backend.write_page(*ptr, page)?;
        }
        Ok(())
    }
}

impl<B: StorageBackend> FreeListPages for Pager<'_, B> {
    fn page(&self, ptr: u64) -> Result<Vec<u8>> {
        self.check(ptr)?;
        match self.updates.get(&ptr) {
            Some(page) => Ok(page.clone()),
            None => self.backend.read_page(ptr),
        }
    }

    fn page_mut(&mut self, ptr: u64) -> Result<&mut [u8]> {
        self.check(ptr)?;
        if !self.updates.contains_key(&ptr) {
            let page = self.backend.read_page(ptr)?;
            self.updates.insert(ptr, page);
        }
        let limit = self.page_count();
        self.updates
            .get_mut(&ptr)
            .map(|page| page.as_mut_slice())
            .ok_or_else(|| out_of_bounds(ptr, limit))
    }

    fn append(&mut self, page: Vec<u8>) -> Result<u64> {
        let ptr = self.page_count();
        self.nappend += 1;
        self.updates.insert(ptr, page);
        Ok(ptr)
    }
}

// =============================================================================
// Write Transaction
// =============================================================================

/// One write transaction: staged pages plus the free list it mutates
pub(crate) struct Txn<'b, B> {
    pager: Pager<'b, B>,
    free: FreeList,
}

impl<'b, B: StorageBackend> Txn<'b, B> {
    /// Start a transaction on top of the committed `meta`
    pub(crate) fn begin(backend: &'b B, meta: &Meta) -> Self {
        let mut free = meta.free_list();
        free.set_max_seq();
        Self {
            pager: Pager::new(backend, meta.page_count),
            free,
        }
    }

    /// The meta this transaction commits as, for a new `root`
    pub(crate) fn next_meta(&self, committed: &Meta, root: u64) -> Meta {
        Meta {
            txid: committed.txid + 1,
            root,
            page_count: self.pager.page_count(),
            head_page: self.free.head_page,
            head_seq: self.free.head_seq,
            tail_page: self.free.tail_page,
            tail_seq: self.free.tail_seq,
        }
    }

    pub(crate) fn pager(&self) -> &Pager<'b, B> {
        &self.pager
    }
}

impl<B: StorageBackend> PageRead for Txn<'_, B> {
    fn get(&self, ptr: u64) -> Result<Node> {
        let page = self.pager.page(ptr)?;
        Node::from_page(ptr, Bytes::from(page))
    }
}

impl<B: StorageBackend> PageAlloc for Txn<'_, B> {
    fn alloc(&mut self, node: Node) -> Result<u64> {
        let page = node.to_page();
        match self.free.pop_head(&mut self.pager)? {
            Some(ptr) => {
                self.pager.stage(ptr, page)?;
                Ok(ptr)
            }
            None => self.pager.append(page),
        }
    }

    fn del(&mut self, ptr: u64) -> Result<()> {
        self.free.push_tail(&mut self.pager, ptr)
    }
}

// =============================================================================
// Read Snapshot
// =============================================================================

/// Read-only view of a committed tree
pub(crate) struct Snapshot<'b, B> {
    backend: &'b B,
    page_count: u64,
}

// manual impls: a derive would require `B: Copy`
impl<B> Clone for Snapshot<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B> Copy for Snapshot<'_, B> {}

impl<'b, B: StorageBackend> Snapshot<'b, B> {
    pub(crate) fn new(backend: &'b B, meta: &Meta) -> Self {
        Self {
            backend,
            page_count: meta.page_count,
        }
    }
}

impl<B: StorageBackend> PageRead for Snapshot<'_, B> {
    fn get(&self, ptr: u64) -> Result<Node> {
        if ptr < META_SLOTS || ptr >= self.page_count {
            return Err(out_of_bounds(ptr, self.page_count));
        }
        let page = self.backend.read_page(ptr)?;
        debug_assert_eq!(page.len(), PAGE_SIZE);
        Node::from_page(ptr, Bytes::from(page))
    }
}
