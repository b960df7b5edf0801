//! Node splitting
//!
//! Values are variable-length, so split points balance byte sizes rather
//! than key counts. An oversized node (at most two pages) becomes two
//! nodes when some split point lets both fit, otherwise three.

use crate::error::{KvError, Result};

use super::node::{Node, NodeBuf, NodeLayout, HEADER, PAGE_SIZE};

/// Encoded size of a node holding entries `from..to` of `node`
fn span_bytes(node: &Node, from: u16, to: u16) -> usize {
    HEADER
        + (to - from) as usize * node.kind().slot_size()
        + (node.offset(to) - node.offset(from)) as usize
}

/// Copy entries `from..to` into a new node
fn slice(node: &Node, from: u16, to: u16) -> Node {
    let mut new = NodeBuf::new(node.kind(), to - from);
    new.append_range(node, 0, from, to - from);
    new.freeze()
}

/// Most balanced point splitting `from..to` into two page-sized nodes
///
/// Returns the split index and the larger half's size.
fn balanced_split(node: &Node, from: u16, to: u16) -> Option<(u16, usize)> {
    let mut best: Option<(u16, usize)> = None;
    for at in from + 1..to {
        let left = span_bytes(node, from, at);
        let right = span_bytes(node, at, to);
        if left > PAGE_SIZE || right > PAGE_SIZE {
            continue;
        }
        let larger = left.max(right);
        if best.map_or(true, |(_, b)| larger < b) {
            best = Some((at, larger));
        }
    }
    best
}

/// Split `node` into 1-3 nodes that each fit in a page
pub(crate) fn split3(node: &Node) -> Result<Vec<Node>> {
    if node.nbytes() <= PAGE_SIZE {
        return Ok(vec![node.clone()]);
    }

    let n = node.nkeys();
    if let Some((at, _)) = balanced_split(node, 0, n) {
        return Ok(vec![slice(node, 0, at), slice(node, at, n)]);
    }

    // no two-way split fits: pick the first cut, then balance the rest
    let mut best: Option<(u16, u16, usize)> = None;
    for first in 1..n.saturating_sub(1) {
        let left = span_bytes(node, 0, first);
        if left > PAGE_SIZE {
            break;
        }
        if let Some((second, rest)) = balanced_split(node, first, n) {
            let larger = left.max(rest);
            if best.map_or(true, |(_, _, b)| larger < b) {
                best = Some((first, second, larger));
            }
        }
    }

    match best {
        Some((first, second, _)) => Ok(vec![
            slice(node, 0, first),
            slice(node, first, second),
            slice(node, second, n),
        ]),
        None => Err(KvError::Corruption(format!(
            "node of {} bytes with {} keys cannot be split into 3 pages",
            node.nbytes(),
            n
        ))),
    }
}
