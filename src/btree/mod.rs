//! B+tree Module
//!
//! Copy-on-write B+tree over page-sized node buffers.
//!
//! ## Responsibilities
//! - Point lookups, ordered cursors
//! - Recursive insert with 1-3 way splits and root growth
//! - Recursive delete with sibling merges and root shrink
//! - Structural verification
//!
//! The tree owns no storage. Every operation takes a page capability:
//! [`PageRead`] for lookups, [`PageAlloc`] for mutations. A mutation never
//! rewrites an existing page: it builds new nodes along the path, allocates
//! them, and frees the pages they replace.
//!
//! ## Shape
//! ```text
//!             [1,      4,      9]          internal: key i = first key of child i
//!             /        |        \
//!      [1, 2, 3]    [4, 6]    [9, 11, 12]   leaves at equal depth
//! ```

mod cursor;
mod delete;
mod insert;
pub mod node;
mod split;
mod verify;

pub use cursor::Cursor;
pub use node::{check_key, check_limit, Node, NodeBuf, NodeKind, NodeLayout};
pub use verify::TreeStats;

use crate::error::Result;

/// Read capability over pages
pub trait PageRead {
    /// Read and decode the node stored at `ptr`
    fn get(&self, ptr: u64) -> Result<Node>;
}

/// Allocation capability over pages, used by mutations
pub trait PageAlloc: PageRead {
    /// Persist `node` in a page and return its number
    fn alloc(&mut self, node: Node) -> Result<u64>;

    /// Release the page at `ptr`
    fn del(&mut self, ptr: u64) -> Result<()>;
}

impl<P: PageRead + ?Sized> PageRead for &P {
    fn get(&self, ptr: u64) -> Result<Node> {
        (**self).get(ptr)
    }
}

/// A B+tree rooted at a page number
///
/// Root `0` is the empty tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTree {
    root: u64,
}

impl BTree {
    /// Tree rooted at `root`
    pub fn new(root: u64) -> Self {
        Self { root }
    }

    /// Current root page (0 when empty)
    pub fn root(&self) -> u64 {
        self.root
    }

    /// Whether the tree holds no keys
    pub fn is_empty(&self) -> bool {
        self.root == 0
    }

    /// Point lookup
    pub fn get<P: PageRead>(&self, pages: &P, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.root == 0 {
            return Ok(None);
        }

        let mut node = pages.get(self.root)?;
        loop {
            let idx = match node.lookup_le(key) {
                Some(idx) => idx,
                None => return Ok(None),
            };
            match node.kind() {
                NodeKind::Leaf => {
                    return Ok((node.key(idx) == key).then(|| node.val(idx).to_vec()));
                }
                NodeKind::Internal => node = pages.get(node.ptr(idx))?,
            }
        }
    }

    /// Cursor positioned at the first key >= `key`
    pub fn seek<P: PageRead>(&self, pages: P, key: &[u8]) -> Result<Cursor<P>> {
        Cursor::seek(pages, self.root, key)
    }

    /// Cursor positioned at the smallest key
    pub fn first<P: PageRead>(&self, pages: P) -> Result<Cursor<P>> {
        Cursor::seek(pages, self.root, &[])
    }
}
