//! Insertion
//!
//! ```text
//! treeInsert(node):
//!   leaf      → new leaf with the entry updated / inserted (may exceed a page)
//!   internal  → treeInsert(child) → split3 → replace 1 pointer with 1-3
//! root       → split3; more than one piece grows the tree by one level
//! ```

use crate::error::Result;

use super::node::{check_limit, Node, NodeBuf, NodeKind, NodeLayout};
use super::split::split3;
use super::{BTree, PageAlloc};

impl BTree {
    /// Insert or update `key`
    ///
    /// Returns `false` when the key already holds `val` (no page touched).
    pub fn insert<P: PageAlloc>(&mut self, pages: &mut P, key: &[u8], val: &[u8]) -> Result<bool> {
        check_limit(key, val)?;

        if self.root == 0 {
            let mut root = NodeBuf::new(NodeKind::Leaf, 1);
            root.append_kv(0, 0, key, val);
            self.root = pages.alloc(root.freeze())?;
            return Ok(true);
        }

        let node = pages.get(self.root)?;
        let updated = match tree_insert(pages, &node, key, val)? {
            Some(updated) => updated,
            None => return Ok(false),
        };

        pages.del(self.root)?;
        self.root = alloc_root(pages, split3(&updated)?)?;
        Ok(true)
    }
}

/// Persist the pieces of a split root, adding a level when there are several
pub(super) fn alloc_root<P: PageAlloc>(pages: &mut P, mut kids: Vec<Node>) -> Result<u64> {
    if kids.len() == 1 {
        let root = kids.remove(0);
        return pages.alloc(root);
    }

    let mut root = NodeBuf::new(NodeKind::Internal, kids.len() as u16);
    for (i, kid) in kids.into_iter().enumerate() {
        let ptr = pages.alloc(kid.clone())?;
        root.append_kv(i as u16, ptr, kid.key(0), &[]);
    }
    pages.alloc(root.freeze())
}

/// Insert into the subtree at `node`, returning its replacement
///
/// The result may occupy up to two pages; `None` means nothing changed.
fn tree_insert<P: PageAlloc>(
    pages: &mut P,
    node: &Node,
    key: &[u8],
    val: &[u8],
) -> Result<Option<Node>> {
    let idx = node.lookup_le(key);

    match node.kind() {
        NodeKind::Leaf => match idx {
            Some(i) if node.key(i) == key => {
                if node.val(i) == val {
                    return Ok(None);
                }
                Ok(Some(leaf_update(node, i, key, val)))
            }
            Some(i) => Ok(Some(leaf_insert(node, i + 1, key, val))),
            None => Ok(Some(leaf_insert(node, 0, key, val))),
        },
        NodeKind::Internal => {
            // smaller than every separator: the first child takes it
            let idx = idx.unwrap_or(0);
            let kptr = node.ptr(idx);
            let child = pages.get(kptr)?;
            let updated = match tree_insert(pages, &child, key, val)? {
                Some(updated) => updated,
                None => return Ok(None),
            };
            let kids = split3(&updated)?;
            pages.del(kptr)?;
            replace_kid_n(pages, node, idx, kids).map(Some)
        }
    }
}

/// Leaf with a new entry at `idx`
fn leaf_insert(old: &Node, idx: u16, key: &[u8], val: &[u8]) -> Node {
    let mut new = NodeBuf::new(NodeKind::Leaf, old.nkeys() + 1);
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, 0, key, val);
    new.append_range(old, idx + 1, idx, old.nkeys() - idx);
    new.freeze()
}

/// Leaf with the entry at `idx` replaced
fn leaf_update(old: &Node, idx: u16, key: &[u8], val: &[u8]) -> Node {
    let mut new = NodeBuf::new(NodeKind::Leaf, old.nkeys());
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, 0, key, val);
    new.append_range(old, idx + 1, idx + 1, old.nkeys() - idx - 1);
    new.freeze()
}

/// Replace the pointer at `idx` with one pointer per kid
///
/// Each kid is allocated and keyed by its first key.
pub(super) fn replace_kid_n<P: PageAlloc>(
    pages: &mut P,
    old: &Node,
    idx: u16,
    kids: Vec<Node>,
) -> Result<Node> {
    let inc = kids.len() as u16;
    let mut new = NodeBuf::new(NodeKind::Internal, old.nkeys() + inc - 1);
    new.append_range(old, 0, 0, idx);
    for (i, kid) in kids.into_iter().enumerate() {
        let ptr = pages.alloc(kid.clone())?;
        new.append_kv(idx + i as u16, ptr, kid.key(0), &[]);
    }
    new.append_range(old, idx + inc, idx + 1, old.nkeys() - (idx + 1));
    Ok(new.freeze())
}
