//! Meta Page
//!
//! The meta page is the single pointer into the otherwise immutable forest
//! of pages: root, page count and free-list anchors. Commits alternate
//! between two slots (pages 0 and 1); the valid slot with the highest
//! transaction id is current, so a torn meta write falls back to the
//! previous commit.
//!
//! ## Slot Format (76 bytes, rest of page zero)
//! ```text
//! ┌───────────┬─────────────┬──────────────┬──────────┬───────────┬─────────────────┐
//! │ Magic (8) │ Version (2) │ Reserved (6) │ TxId (8) │ Root (8)  │ PageCount (8)   │
//! ├───────────┴─────────────┴──────────────┼──────────┴───────────┼─────────────────┤
//! │ HeadPage (8) │ HeadSeq (8)             │ TailPage (8)         │ TailSeq (8)     │
//! ├──────────────┴─────────────────────────┴──────────────────────┴─────────────────┤
//! │ CRC32 of bytes 0..72 (4)                                                         │
//! └──────────────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::btree::node::PAGE_SIZE;
use crate::error::{KvError, Result};
use crate::freelist::FreeList;

/// Magic bytes identifying a cowkv store
pub const MAGIC: &[u8; 8] = b"COWKVDB\0";

/// Current meta format version
pub const VERSION: u16 = 1;

/// Pages reserved for the two meta slots
pub const META_SLOTS: u64 = 2;

/// Page holding the first free-list node of a new store
pub const INITIAL_FREELIST_PAGE: u64 = 2;

/// Page count of a new store
pub const INITIAL_PAGE_COUNT: u64 = 3;

const CHECKSUMMED_SIZE: usize = 72;

/// Encoded meta slot size
pub const META_SIZE: usize = CHECKSUMMED_SIZE + 4;

/// The committed state of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    /// Transaction id of the commit that wrote this meta
    pub txid: u64,
    /// Root page of the B+tree (0 = empty)
    pub root: u64,
    /// Number of pages in use (the file may be longer)
    pub page_count: u64,
    /// Free list head node
    pub head_page: u64,
    /// Free list head sequence
    pub head_seq: u64,
    /// Free list tail node
    pub tail_page: u64,
    /// Free list tail sequence
    pub tail_seq: u64,
}

impl Meta {
    /// Meta of a freshly created store
    pub fn initial() -> Self {
        Self {
            txid: 1,
            root: 0,
            page_count: INITIAL_PAGE_COUNT,
            head_page: INITIAL_FREELIST_PAGE,
            head_seq: 0,
            tail_page: INITIAL_FREELIST_PAGE,
            tail_seq: 0,
        }
    }

    /// Slot page this meta is written to
    pub fn slot(&self) -> u64 {
        self.txid % META_SLOTS
    }

    /// Free list restored from the anchors
    pub fn free_list(&self) -> FreeList {
        FreeList::new(self.head_page, self.head_seq, self.tail_page, self.tail_seq)
    }

    /// Encode into a full page image
    pub fn encode(&self) -> Vec<u8> {
        let mut page = vec![0u8; PAGE_SIZE];
        page[0..8].copy_from_slice(MAGIC);
        page[8..10].copy_from_slice(&VERSION.to_le_bytes());
        let fields = [
            self.txid,
            self.root,
            self.page_count,
            self.head_page,
            self.head_seq,
            self.tail_page,
            self.tail_seq,
        ];
        for (i, field) in fields.iter().enumerate() {
            let pos = 16 + 8 * i;
            page[pos..pos + 8].copy_from_slice(&field.to_le_bytes());
        }
        let crc = crc32fast::hash(&page[..CHECKSUMMED_SIZE]);
        page[CHECKSUMMED_SIZE..META_SIZE].copy_from_slice(&crc.to_le_bytes());
        page
    }

    /// Decode a slot image
    ///
    /// Returns `Ok(None)` for a blank or torn slot (bad magic or checksum),
    /// and an error for a well-formed slot of an unsupported version.
    pub fn decode(page: &[u8]) -> Result<Option<Self>> {
        if page.len() < META_SIZE || &page[0..8] != MAGIC {
            return Ok(None);
        }
        let stored = u32::from_le_bytes([page[72], page[73], page[74], page[75]]);
        if crc32fast::hash(&page[..CHECKSUMMED_SIZE]) != stored {
            return Ok(None);
        }

        let version = u16::from_le_bytes([page[8], page[9]]);
        if version != VERSION {
            return Err(KvError::Corruption(format!(
                "unsupported meta version {} (expected {})",
                version, VERSION
            )));
        }

        let field = |i: usize| {
            let pos = 16 + 8 * i;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&page[pos..pos + 8]);
            u64::from_le_bytes(raw)
        };
        let meta = Self {
            txid: field(0),
            root: field(1),
            page_count: field(2),
            head_page: field(3),
            head_seq: field(4),
            tail_page: field(5),
            tail_seq: field(6),
        };
        meta.validate()?;
        Ok(Some(meta))
    }

    /// Pick the current meta from the two slot images
    ///
    /// A slot that fails to decode is skipped while the other one holds a
    /// valid meta; its error is returned only when no slot is usable.
    pub fn recover(slot0: &[u8], slot1: &[u8]) -> Result<Self> {
        let mut best: Option<Self> = None;
        let mut first_err = None;
        for (i, raw) in [slot0, slot1].into_iter().enumerate() {
            match Self::decode(raw) {
                Ok(Some(meta)) => {
                    if best.map_or(true, |b| meta.txid > b.txid) {
                        best = Some(meta);
                    }
                }
                Ok(None) => {
                    if raw.iter().any(|b| *b != 0) {
                        tracing::warn!("Meta slot {} failed its checksum, ignoring", i);
                    }
                }
                Err(e) => {
                    tracing::warn!("Meta slot {} is unusable, ignoring: {}", i, e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match (best, first_err) {
            (Some(meta), _) => Ok(meta),
            (None, Some(e)) => Err(e),
            (None, None) => Err(KvError::Corruption("no valid meta page".to_string())),
        }
    }

    fn validate(&self) -> Result<()> {
        let in_range = |ptr: u64| ptr >= META_SLOTS && ptr < self.page_count;
        if self.page_count < INITIAL_PAGE_COUNT
            || (self.root != 0 && !in_range(self.root))
            || !in_range(self.head_page)
            || !in_range(self.tail_page)
            || self.head_seq > self.tail_seq
        {
            return Err(KvError::Corruption(format!("inconsistent meta page: {:?}", self)));
        }
        Ok(())
    }
}
