//! Structural verification
//!
//! Walks the whole tree and checks the invariants every committed tree
//! must satisfy:
//! - every node encodes to at most one page and holds at least one key
//! - keys strictly increase across the leaf level
//! - the separator for child `i` equals the child's first key
//! - all leaves sit at the same depth

use crate::error::{KvError, Result};

use super::node::{NodeKind, NodeLayout, PAGE_SIZE};
use super::{BTree, PageRead};

/// Shape of a verified tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Levels from root to leaf (0 for the empty tree)
    pub height: usize,
    /// Number of internal nodes
    pub internal_nodes: usize,
    /// Number of leaves
    pub leaves: usize,
    /// Number of key-value pairs
    pub keys: usize,
}

struct Walk<'p, P> {
    pages: &'p P,
    stats: TreeStats,
    leaf_depth: Option<usize>,
    last_key: Option<Vec<u8>>,
}

impl BTree {
    /// Check the tree's structural invariants
    pub fn verify<P: PageRead>(&self, pages: &P) -> Result<TreeStats> {
        let mut walk = Walk {
            pages,
            stats: TreeStats::default(),
            leaf_depth: None,
            last_key: None,
        };
        if self.root != 0 {
            walk.visit(self.root, 1, None)?;
        }
        walk.stats.height = walk.leaf_depth.unwrap_or(0);
        Ok(walk.stats)
    }
}

impl<P: PageRead> Walk<'_, P> {
    fn visit(&mut self, ptr: u64, depth: usize, separator: Option<&[u8]>) -> Result<()> {
        let corrupt = |what: String| KvError::Corruption(format!("page {}: {}", ptr, what));
        let node = self.pages.get(ptr)?;

        if node.nbytes() > PAGE_SIZE {
            return Err(corrupt(format!("node of {} bytes exceeds a page", node.nbytes())));
        }
        if node.nkeys() == 0 {
            return Err(corrupt("empty node".to_string()));
        }
        if let Some(separator) = separator {
            if node.key(0) != separator {
                return Err(corrupt("first key differs from the parent separator".to_string()));
            }
        }

        match node.kind() {
            NodeKind::Internal => {
                self.stats.internal_nodes += 1;
                for i in 0..node.nkeys() {
                    self.visit(node.ptr(i), depth + 1, Some(node.key(i)))?;
                }
            }
            NodeKind::Leaf => {
                self.stats.leaves += 1;
                match self.leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(corrupt(format!(
                            "leaf at depth {} (expected {})",
                            depth, expected
                        )));
                    }
                    _ => self.leaf_depth = Some(depth),
                }
                for i in 0..node.nkeys() {
                    let key = node.key(i);
                    if let Some(last) = &self.last_key {
                        if last.as_slice() >= key {
                            return Err(corrupt(format!("key order violated at entry {}", i)));
                        }
                    }
                    self.last_key = Some(key.to_vec());
                    self.stats.keys += 1;
                }
            }
        }
        Ok(())
    }
}
