//! Free List Module
//!
//! Persistent FIFO of reclaimed page numbers, stored in a linked chain of
//! pages drawn from the same allocator it feeds.
//!
//! ## Node Format
//! ```text
//! ┌──────────┬───────────────────────────────┐
//! │ next (8) │ pointers (FREELIST_CAP × 8)   │
//! └──────────┴───────────────────────────────┘
//! ```
//!
//! Every item carries a sequence number; item `seq` lives in slot
//! `seq % FREELIST_CAP` of its node. The live items are `head_seq..tail_seq`.
//!
//! ## Reuse Gate
//! `max_seq` is the tail sequence captured when a transaction starts. Only
//! items below it (freed by already committed transactions) are handed out,
//! so a page freed by the running transaction, whose old content the last
//! committed tree may still reference, is never overwritten before commit.
//!
//! ## Recycling
//! An exhausted head node is itself pushed onto the tail, and a full tail
//! node takes its successor from the head when possible.

use crate::btree::node::PAGE_SIZE;
use crate::error::{KvError, Result};

const NEXT_SIZE: usize = 8;
const PTR_SIZE: usize = 8;

/// Item slots per free-list node
pub const FREELIST_CAP: usize = (PAGE_SIZE - NEXT_SIZE) / PTR_SIZE;

/// Page access needed by the free list
pub trait FreeListPages {
    /// Current image of page `ptr`
    fn page(&self, ptr: u64) -> Result<Vec<u8>>;

    /// Writable staged image of page `ptr`
    fn page_mut(&mut self, ptr: u64) -> Result<&mut [u8]>;

    /// Append a new page at the end of the file
    fn append(&mut self, page: Vec<u8>) -> Result<u64>;
}

fn seq_to_idx(seq: u64) -> usize {
    (seq % FREELIST_CAP as u64) as usize
}

fn read_u64(page: &[u8], pos: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&page[pos..pos + 8]);
    u64::from_le_bytes(raw)
}

fn next_of(page: &[u8]) -> u64 {
    read_u64(page, 0)
}

fn set_next(page: &mut [u8], next: u64) {
    page[..NEXT_SIZE].copy_from_slice(&next.to_le_bytes());
}

fn ptr_at(page: &[u8], idx: usize) -> u64 {
    read_u64(page, NEXT_SIZE + PTR_SIZE * idx)
}

fn set_ptr_at(page: &mut [u8], idx: usize, ptr: u64) {
    let pos = NEXT_SIZE + PTR_SIZE * idx;
    page[pos..pos + PTR_SIZE].copy_from_slice(&ptr.to_le_bytes());
}

/// Free list anchors and reuse gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeList {
    /// Node holding the oldest item
    pub head_page: u64,
    /// Sequence of the oldest item
    pub head_seq: u64,
    /// Node receiving new items
    pub tail_page: u64,
    /// Sequence the next pushed item gets
    pub tail_seq: u64,
    max_seq: u64,
}

impl FreeList {
    /// Restore the persisted anchors; nothing is poppable until [`FreeList::set_max_seq`]
    pub fn new(head_page: u64, head_seq: u64, tail_page: u64, tail_seq: u64) -> Self {
        Self {
            head_page,
            head_seq,
            tail_page,
            tail_seq,
            max_seq: head_seq,
        }
    }

    /// Capture the reuse gate at transaction start
    pub fn set_max_seq(&mut self) {
        self.max_seq = self.tail_seq;
    }

    /// Number of items in the list
    pub fn len(&self) -> u64 {
        self.tail_seq - self.head_seq
    }

    /// Whether the list holds no items
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the oldest reusable page, if any
    pub fn pop_head<P: FreeListPages>(&mut self, pages: &mut P) -> Result<Option<u64>> {
        let (ptr, exhausted) = self.pop(pages)?;
        if let Some(exhausted) = exhausted {
            self.push_tail(pages, exhausted)?;
        }
        if let Some(ptr) = ptr {
            tracing::trace!("Reusing free page {}", ptr);
        }
        Ok(ptr)
    }

    /// Pop one item; also returns the head node page if it was exhausted
    fn pop<P: FreeListPages>(&mut self, pages: &mut P) -> Result<(Option<u64>, Option<u64>)> {
        if self.head_seq >= self.max_seq {
            return Ok((None, None));
        }

        let node = pages.page(self.head_page)?;
        let ptr = ptr_at(&node, seq_to_idx(self.head_seq));
        self.head_seq += 1;

        let mut exhausted = None;
        if seq_to_idx(self.head_seq) == 0 {
            let next = next_of(&node);
            if next == 0 {
                return Err(KvError::Corruption(format!(
                    "free list node {} has no successor at seq {}",
                    self.head_page, self.head_seq
                )));
            }
            exhausted = Some(self.head_page);
            self.head_page = next;
        }
        Ok((Some(ptr), exhausted))
    }

    /// Append a freed page
    pub fn push_tail<P: FreeListPages>(&mut self, pages: &mut P, ptr: u64) -> Result<()> {
        set_ptr_at(pages.page_mut(self.tail_page)?, seq_to_idx(self.tail_seq), ptr);
        self.tail_seq += 1;

        if seq_to_idx(self.tail_seq) != 0 {
            return Ok(());
        }

        // tail node is full: link a successor, reusing the head if possible
        let (next, exhausted) = self.pop(pages)?;
        let next = match next {
            Some(next) => {
                pages.page_mut(next)?.fill(0);
                next
            }
            None => pages.append(vec![0u8; PAGE_SIZE])?,
        };
        set_next(pages.page_mut(self.tail_page)?, next);
        self.tail_page = next;

        if let Some(exhausted) = exhausted {
            set_ptr_at(pages.page_mut(self.tail_page)?, 0, exhausted);
            self.tail_seq += 1;
        }
        Ok(())
    }
}
