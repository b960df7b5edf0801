//! Ordered cursor over the leaf level
//!
//! Keeps the root-to-leaf path of (node, index) pairs and walks it forward.

use crate::error::Result;

use super::node::{Node, NodeKind, NodeLayout};
use super::PageRead;

/// Forward iterator over `(key, value)` pairs in key order
pub struct Cursor<P> {
    pages: P,
    path: Vec<(Node, u16)>,
}

impl<P: PageRead> Cursor<P> {
    /// Position at the first key >= `key` in the tree rooted at `root`
    pub fn seek(pages: P, root: u64, key: &[u8]) -> Result<Self> {
        let mut cursor = Self {
            pages,
            path: Vec::new(),
        };
        if root == 0 {
            return Ok(cursor);
        }

        let mut node = cursor.pages.get(root)?;
        loop {
            let idx = node.lookup_le(key);
            match node.kind() {
                NodeKind::Internal => {
                    let idx = idx.unwrap_or(0);
                    let child = cursor.pages.get(node.ptr(idx))?;
                    cursor.path.push((node, idx));
                    node = child;
                }
                NodeKind::Leaf => {
                    let idx = match idx {
                        Some(i) if node.key(i) == key => i,
                        // the located key is smaller; the next one is the first >=
                        Some(i) => i + 1,
                        None => 0,
                    };
                    cursor.path.push((node, idx));
                    break;
                }
            }
        }
        Ok(cursor)
    }

    /// Whether the cursor is past the last key
    pub fn is_exhausted(&self) -> bool {
        self.path.is_empty()
    }

    /// Move one entry forward, crossing leaves as needed
    fn advance(&mut self) -> Result<()> {
        while let Some((node, idx)) = self.path.last_mut() {
            *idx += 1;
            if *idx < node.nkeys() {
                break;
            }
            self.path.pop();
        }

        // descend to the leftmost leaf under the new position
        while let Some((node, idx)) = self.path.last() {
            if node.kind() == NodeKind::Leaf {
                break;
            }
            let child = self.pages.get(node.ptr(*idx))?;
            self.path.push((child, 0));
        }
        Ok(())
    }
}

impl<P: PageRead> Iterator for Cursor<P> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (leaf, idx) = self.path.last()?;
            if *idx < leaf.nkeys() {
                let item = (leaf.key(*idx).to_vec(), leaf.val(*idx).to_vec());
                if let Err(e) = self.advance() {
                    self.path.clear();
                    return Some(Err(e));
                }
                return Some(Ok(item));
            }
            // seek landed past the end of a leaf
            if let Err(e) = self.advance() {
                self.path.clear();
                return Some(Err(e));
            }
        }
    }
}
