//! Deletion
//!
//! A child that shrinks to a quarter page or less after a delete is merged
//! into its left sibling, or else its right sibling, when the result fits in
//! one page. The same quarter-page threshold never triggers on freshly split
//! nodes of normal occupancy, so splits and merges do not ping-pong.

use crate::error::{KvError, Result};

use super::insert::{alloc_root, replace_kid_n};
use super::node::{Node, NodeBuf, NodeKind, NodeLayout, HEADER, MAX_KEY_SIZE, PAGE_SIZE};
use super::split::split3;
use super::{BTree, PageAlloc};

/// Nodes at or below this size look for a sibling to merge with
pub const MERGE_THRESHOLD: usize = PAGE_SIZE / 4;

/// Outcome of the merge check for an updated child
enum Merge {
    Left(Node),
    Right(Node),
    None,
}

impl BTree {
    /// Delete `key`, returning whether it was present
    pub fn delete<P: PageAlloc>(&mut self, pages: &mut P, key: &[u8]) -> Result<bool> {
        // an oversized key can never have been stored
        if key.len() > MAX_KEY_SIZE || self.root == 0 {
            return Ok(false);
        }

        let node = pages.get(self.root)?;
        let updated = match tree_delete(pages, &node, key)? {
            Some(updated) => updated,
            None => return Ok(false),
        };
        pages.del(self.root)?;

        if updated.nkeys() == 0 {
            self.root = 0;
        } else if updated.kind() == NodeKind::Internal && updated.nkeys() == 1 {
            // shrink while the root has a single child
            let mut root = updated.ptr(0);
            loop {
                let node = pages.get(root)?;
                if node.kind() != NodeKind::Internal || node.nkeys() != 1 {
                    break;
                }
                pages.del(root)?;
                root = node.ptr(0);
            }
            self.root = root;
        } else {
            // a longer separator may have pushed the root past one page
            self.root = alloc_root(pages, split3(&updated)?)?;
        }
        Ok(true)
    }
}

/// Delete from the subtree at `node`; `None` means the key was absent
fn tree_delete<P: PageAlloc>(pages: &mut P, node: &Node, key: &[u8]) -> Result<Option<Node>> {
    let idx = match node.lookup_le(key) {
        Some(idx) => idx,
        None => return Ok(None),
    };

    match node.kind() {
        NodeKind::Leaf => {
            if node.key(idx) != key {
                return Ok(None);
            }
            Ok(Some(leaf_delete(node, idx)))
        }
        NodeKind::Internal => node_delete(pages, node, idx, key),
    }
}

fn node_delete<P: PageAlloc>(
    pages: &mut P,
    node: &Node,
    idx: u16,
    key: &[u8],
) -> Result<Option<Node>> {
    let kptr = node.ptr(idx);
    let child = pages.get(kptr)?;
    let updated = match tree_delete(pages, &child, key)? {
        Some(updated) => updated,
        None => return Ok(None),
    };
    pages.del(kptr)?;

    let new = match should_merge(pages, node, idx, &updated)? {
        Merge::Left(sibling) => {
            let merged = merge(&sibling, &updated)?;
            pages.del(node.ptr(idx - 1))?;
            let ptr = pages.alloc(merged.clone())?;
            replace_2_kids(node, idx - 1, ptr, merged.key(0))
        }
        Merge::Right(sibling) => {
            let merged = merge(&updated, &sibling)?;
            pages.del(node.ptr(idx + 1))?;
            let ptr = pages.alloc(merged.clone())?;
            replace_2_kids(node, idx, ptr, merged.key(0))
        }
        Merge::None if updated.nkeys() == 0 => remove_kid(node, idx),
        Merge::None => replace_kid_n(pages, node, idx, split3(&updated)?)?,
    };
    Ok(Some(new))
}

/// Decide whether the updated child at `idx` merges with a sibling
fn should_merge<P: PageAlloc>(
    pages: &mut P,
    node: &Node,
    idx: u16,
    updated: &Node,
) -> Result<Merge> {
    if updated.nbytes() > MERGE_THRESHOLD {
        return Ok(Merge::None);
    }

    if idx > 0 {
        let sibling = pages.get(node.ptr(idx - 1))?;
        if sibling.nbytes() + updated.nbytes() - HEADER <= PAGE_SIZE {
            return Ok(Merge::Left(sibling));
        }
    }
    if idx + 1 < node.nkeys() {
        let sibling = pages.get(node.ptr(idx + 1))?;
        if sibling.nbytes() + updated.nbytes() - HEADER <= PAGE_SIZE {
            return Ok(Merge::Right(sibling));
        }
    }
    Ok(Merge::None)
}

/// Concatenate two adjacent siblings
fn merge(left: &Node, right: &Node) -> Result<Node> {
    if left.kind() != right.kind() {
        return Err(KvError::Corruption(format!(
            "siblings of different kinds: {:?} and {:?}",
            left.kind(),
            right.kind()
        )));
    }
    let mut new = NodeBuf::new(left.kind(), left.nkeys() + right.nkeys());
    new.append_range(left, 0, 0, left.nkeys());
    new.append_range(right, left.nkeys(), 0, right.nkeys());
    Ok(new.freeze())
}

/// Leaf without the entry at `idx`
fn leaf_delete(old: &Node, idx: u16) -> Node {
    let mut new = NodeBuf::new(NodeKind::Leaf, old.nkeys() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_range(old, idx, idx + 1, old.nkeys() - (idx + 1));
    new.freeze()
}

/// Replace the pointers at `idx` and `idx + 1` with a single one
fn replace_2_kids(old: &Node, idx: u16, ptr: u64, key: &[u8]) -> Node {
    let mut new = NodeBuf::new(NodeKind::Internal, old.nkeys() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_kv(idx, ptr, key, &[]);
    new.append_range(old, idx + 1, idx + 2, old.nkeys() - (idx + 2));
    new.freeze()
}

/// Drop the pointer at `idx` (its child became empty)
fn remove_kid(old: &Node, idx: u16) -> Node {
    let mut new = NodeBuf::new(NodeKind::Internal, old.nkeys() - 1);
    new.append_range(old, 0, 0, idx);
    new.append_range(old, idx, idx + 1, old.nkeys() - (idx + 1));
    new.freeze()
}
