//! Node Codec
//!
//! A node is a page-sized byte buffer interpreted through accessor methods.
//!
//! ## Layout (all integers little-endian)
//! ```text
//! ┌──────────┬───────────┬──────────────────┬────────────────┬─────────────┐
//! │ kind (2) │ nkeys (2) │ ptrs (nkeys × 8) │ offsets (n × 2)│ entries ... │
//! └──────────┴───────────┴──────────────────┴────────────────┴─────────────┘
//!                          internal only
//!
//! entry: ┌──────────┬──────────┬─────┬───────┐
//!        │ klen (2) │ vlen (2) │ key │ value │
//!        └──────────┴──────────┴─────┴───────┘
//! ```
//!
//! `offset[i]` is the end of entry `i - 1` relative to the first entry, so
//! `offset[0] = 0` is implicit and `offset[nkeys]` is the entries' total size.
//!
//! Two views share the read accessors through [`NodeLayout`]:
//! - [`Node`]: immutable, validated on decode, cheap to clone
//! - [`NodeBuf`]: a two-page scratch buffer that new nodes are built in,
//!   then frozen into a [`Node`]

use std::cmp::Ordering;
use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::error::{KvError, Result};

// =============================================================================
// Format Constants
// =============================================================================

/// Size of a page (and the maximum encoded size of a persisted node)
pub const PAGE_SIZE: usize = 4096;

/// Node header: kind (2) + nkeys (2)
pub const HEADER: usize = 4;

/// Largest admissible key
pub const MAX_KEY_SIZE: usize = 1000;

/// Largest admissible value
pub const MAX_VAL_SIZE: usize = 3000;

const PTR_SIZE: usize = 8;
const OFFSET_SIZE: usize = 2;
const KV_HEADER: usize = 4;

// A node holding one maximal entry must fit in a page.
const _: () = assert!(
    HEADER + PTR_SIZE + OFFSET_SIZE + KV_HEADER + MAX_KEY_SIZE + MAX_VAL_SIZE <= PAGE_SIZE
);

/// Node kinds stored in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NodeKind {
    /// Keys with child pointers, no values
    Internal = 1,
    /// Keys with values
    Leaf = 2,
}

impl NodeKind {
    /// Decode the on-disk tag
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(NodeKind::Internal),
            2 => Some(NodeKind::Leaf),
            _ => None,
        }
    }

    /// Bytes of pointer array per key
    fn ptr_size(self) -> usize {
        match self {
            NodeKind::Internal => PTR_SIZE,
            NodeKind::Leaf => 0,
        }
    }

    /// Per-key bytes of pointer and offset tables
    pub(crate) fn slot_size(self) -> usize {
        self.ptr_size() + OFFSET_SIZE
    }
}

/// Admission check for a key-value pair
///
/// The only way a logical update is rejected before it is attempted.
pub fn check_limit(key: &[u8], val: &[u8]) -> Result<()> {
    check_key(key)?;
    if val.len() > MAX_VAL_SIZE {
        return Err(KvError::ValueTooLarge {
            len: val.len(),
            max: MAX_VAL_SIZE,
        });
    }
    Ok(())
}

/// Admission check for a key alone
pub fn check_key(key: &[u8]) -> Result<()> {
    if key.len() > MAX_KEY_SIZE {
        return Err(KvError::KeyTooLarge {
            len: key.len(),
            max: MAX_KEY_SIZE,
        });
    }
    Ok(())
}

fn read_u16(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

fn read_u64(buf: &[u8], pos: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[pos..pos + 8]);
    u64::from_le_bytes(raw)
}

// =============================================================================
// Read Accessors
// =============================================================================

/// Read accessors over the node layout
///
/// Index arguments are bounds-checked with assertions: a violation means an
/// algorithm bug, since pages are validated when decoded.
pub trait NodeLayout {
    /// Raw node bytes
    fn bytes(&self) -> &[u8];

    /// Node kind from the header
    fn kind(&self) -> NodeKind;

    /// Number of keys
    fn nkeys(&self) -> u16 {
        read_u16(self.bytes(), 2)
    }

    /// Child pointer at `idx` (internal nodes only)
    fn ptr(&self, idx: u16) -> u64 {
        assert_eq!(self.kind(), NodeKind::Internal, "leaf nodes have no pointers");
        assert!(idx < self.nkeys(), "pointer index {} out of bounds", idx);
        read_u64(self.bytes(), HEADER + PTR_SIZE * idx as usize)
    }

    /// Position of the offset slot for entry `idx` (1-based)
    fn offset_pos(&self, idx: u16) -> usize {
        assert!(1 <= idx && idx <= self.nkeys(), "offset index {} out of bounds", idx);
        HEADER
            + self.nkeys() as usize * self.kind().ptr_size()
            + OFFSET_SIZE * (idx as usize - 1)
    }

    /// Cumulative end offset of entry `idx - 1`
    fn offset(&self, idx: u16) -> u16 {
        if idx == 0 {
            return 0;
        }
        read_u16(self.bytes(), self.offset_pos(idx))
    }

    /// Absolute position of entry `idx` (`idx == nkeys` is the end)
    fn kv_pos(&self, idx: u16) -> usize {
        assert!(idx <= self.nkeys(), "entry index {} out of bounds", idx);
        HEADER
            + self.nkeys() as usize * (self.kind().ptr_size() + OFFSET_SIZE)
            + self.offset(idx) as usize
    }

    /// Key at `idx`
    fn key(&self, idx: u16) -> &[u8] {
        assert!(idx < self.nkeys(), "key index {} out of bounds", idx);
        let pos = self.kv_pos(idx);
        let klen = read_u16(self.bytes(), pos) as usize;
        &self.bytes()[pos + KV_HEADER..pos + KV_HEADER + klen]
    }

    /// Value at `idx` (empty for internal nodes)
    fn val(&self, idx: u16) -> &[u8] {
        assert!(idx < self.nkeys(), "value index {} out of bounds", idx);
        let pos = self.kv_pos(idx);
        let klen = read_u16(self.bytes(), pos) as usize;
        let vlen = read_u16(self.bytes(), pos + 2) as usize;
        let start = pos + KV_HEADER + klen;
        &self.bytes()[start..start + vlen]
    }

    /// Total encoded size
    fn nbytes(&self) -> usize {
        self.kv_pos(self.nkeys())
    }

    /// Index of the greatest key <= `key`, or `None` if `key` precedes all keys
    ///
    /// Binary search over the offset table.
    fn lookup_le(&self, key: &[u8]) -> Option<u16> {
        let (mut lo, mut hi) = (0u16, self.nkeys());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.key(mid).cmp(key) {
                Ordering::Less | Ordering::Equal => lo = mid + 1,
                Ordering::Greater => hi = mid,
            }
        }
        lo.checked_sub(1)
    }
}

// =============================================================================
// Immutable Node
// =============================================================================

/// An immutable, encoded node
///
/// Nodes read from storage are validated once by [`Node::from_page`]; nodes
/// built in memory come from [`NodeBuf::freeze`].
#[derive(Clone)]
pub struct Node {
    data: Bytes,
    kind: NodeKind,
}

impl Node {
    /// Decode and validate a page image
    ///
    /// Rejects unknown kinds, key counts that overflow the page and offset
    /// tables that disagree with the entry length prefixes.
    pub fn from_page(ptr: u64, data: Bytes) -> Result<Self> {
        let corrupt = |what: String| KvError::Corruption(format!("page {}: {}", ptr, what));

        if data.len() < HEADER {
            return Err(corrupt(format!("node shorter than header ({} bytes)", data.len())));
        }
        let raw_kind = read_u16(&data, 0);
        let kind = NodeKind::from_raw(raw_kind)
            .ok_or_else(|| corrupt(format!("unknown node kind {}", raw_kind)))?;
        let nkeys = read_u16(&data, 2) as usize;

        let entries_start = HEADER + nkeys * (kind.ptr_size() + OFFSET_SIZE);
        if entries_start > data.len() {
            return Err(corrupt(format!("{} keys overflow the page", nkeys)));
        }

        let offsets_start = HEADER + nkeys * kind.ptr_size();
        let mut prev = 0usize;
        for i in 0..nkeys {
            let offset = read_u16(&data, offsets_start + OFFSET_SIZE * i) as usize;
            let pos = entries_start + prev;
            if pos + KV_HEADER > data.len() {
                return Err(corrupt(format!("entry {} starts past the page end", i)));
            }
            let klen = read_u16(&data, pos) as usize;
            let vlen = read_u16(&data, pos + 2) as usize;
            if offset != prev + KV_HEADER + klen + vlen || entries_start + offset > data.len() {
                return Err(corrupt(format!("malformed offset table at entry {}", i)));
            }
            prev = offset;
        }

        Ok(Self { data, kind })
    }

    /// Encode into a zero-padded page image
    ///
    /// # Panics
    /// If the node does not fit in one page; nodes are split before persisting.
    pub fn to_page(&self) -> Vec<u8> {
        let used = self.nbytes();
        assert!(used <= PAGE_SIZE, "node of {} bytes exceeds the page size", used);
        let mut page = vec![0u8; PAGE_SIZE];
        page[..used].copy_from_slice(&self.data[..used]);
        page
    }
}

impl NodeLayout for Node {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.kind)
            .field("nkeys", &self.nkeys())
            .field("nbytes", &self.nbytes())
            .finish()
    }
}

// =============================================================================
// Node Builder
// =============================================================================

/// Scratch buffer for building a new node
///
/// Sized at two pages so that an insert may overflow one page before the
/// result is split. Entries must be appended in index order after the header
/// fixes the key count.
pub struct NodeBuf {
    buf: BytesMut,
    kind: NodeKind,
}

impl NodeBuf {
    /// Start a node of `kind` holding exactly `nkeys` entries
    pub fn new(kind: NodeKind, nkeys: u16) -> Self {
        let mut buf = BytesMut::zeroed(2 * PAGE_SIZE);
        buf[0..2].copy_from_slice(&(kind as u16).to_le_bytes());
        buf[2..4].copy_from_slice(&nkeys.to_le_bytes());
        Self { buf, kind }
    }

    /// Set the child pointer at `idx`
    pub fn set_ptr(&mut self, idx: u16, ptr: u64) {
        assert_eq!(self.kind, NodeKind::Internal, "leaf nodes have no pointers");
        assert!(idx < self.nkeys(), "pointer index {} out of bounds", idx);
        let pos = HEADER + PTR_SIZE * idx as usize;
        self.buf[pos..pos + PTR_SIZE].copy_from_slice(&ptr.to_le_bytes());
    }

    fn set_offset(&mut self, idx: u16, offset: u16) {
        let pos = self.offset_pos(idx);
        self.buf[pos..pos + OFFSET_SIZE].copy_from_slice(&offset.to_le_bytes());
    }

    /// Append the entry at `idx`; `ptr` is ignored for leaves
    pub fn append_kv(&mut self, idx: u16, ptr: u64, key: &[u8], val: &[u8]) {
        if self.kind == NodeKind::Internal {
            self.set_ptr(idx, ptr);
        }
        let pos = self.kv_pos(idx);
        self.buf[pos..pos + 2].copy_from_slice(&(key.len() as u16).to_le_bytes());
        self.buf[pos + 2..pos + 4].copy_from_slice(&(val.len() as u16).to_le_bytes());
        let key_start = pos + KV_HEADER;
        self.buf[key_start..key_start + key.len()].copy_from_slice(key);
        let val_start = key_start + key.len();
        self.buf[val_start..val_start + val.len()].copy_from_slice(val);

        let end = self.offset(idx) as usize + KV_HEADER + key.len() + val.len();
        self.set_offset(idx + 1, end as u16);
    }

    /// Copy `n` entries from `old[src..]` into `self[dst..]`
    pub fn append_range<N: NodeLayout>(&mut self, old: &N, dst: u16, src: u16, n: u16) {
        if n == 0 {
            return;
        }
        assert!(src + n <= old.nkeys(), "source range out of bounds");
        assert!(dst + n <= self.nkeys(), "destination range out of bounds");

        if self.kind == NodeKind::Internal {
            for i in 0..n {
                self.set_ptr(dst + i, old.ptr(src + i));
            }
        }

        // offsets are rebased onto the destination's first entry
        let dst_begin = self.offset(dst);
        let src_begin = old.offset(src);
        for i in 1..=n {
            let offset = dst_begin + (old.offset(src + i) - src_begin);
            self.set_offset(dst + i, offset);
        }

        let begin = old.kv_pos(src);
        let end = old.kv_pos(src + n);
        let at = self.kv_pos(dst);
        self.buf[at..at + (end - begin)].copy_from_slice(&old.bytes()[begin..end]);
    }

    /// Finish the node
    pub fn freeze(self) -> Node {
        let used = self.nbytes();
        let mut buf = self.buf;
        buf.truncate(used);
        Node {
            data: buf.freeze(),
            kind: self.kind,
        }
    }
}

impl NodeLayout for NodeBuf {
    fn bytes(&self) -> &[u8] {
        &self.buf
    }

    fn kind(&self) -> NodeKind {
        self.kind
    }
}
