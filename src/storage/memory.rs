//! In-memory storage
//!
//! Keeps durable and pending pages apart so tests can simulate a crash:
//! writes land in `pending` until `sync`, and [`InMemoryBackend::crash`]
//! keeps only what was synced. Faults can be injected after a number of
//! operations to exercise every step of the commit protocol.

use std::collections::HashMap;
use std::io;

use parking_lot::Mutex;

use crate::btree::node::PAGE_SIZE;
use crate::error::{KvError, Result};

use super::{bootstrap_pages, StorageBackend};

#[derive(Default)]
struct State {
    durable: HashMap<u64, Vec<u8>>,
    pending: HashMap<u64, Vec<u8>>,
    ops: u64,
    fail_at: Option<u64>,
}

impl State {
    /// Count one write or sync; error once the fault point is reached
    fn tick(&mut self) -> Result<()> {
        let op = self.ops;
        self.ops += 1;
        match self.fail_at {
            Some(fail_at) if op >= fail_at => {
                Err(io::Error::new(io::ErrorKind::Other, "injected fault").into())
            }
            _ => Ok(()),
        }
    }

    fn page_count(&self) -> u64 {
        self.durable
            .keys()
            .chain(self.pending.keys())
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// Volatile page store with crash simulation and fault injection
#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    /// Empty backend (no pages; the store bootstraps it on open)
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend already holding a durable empty store
    pub fn bootstrapped() -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state.lock();
            for (ptr, page) in bootstrap_pages().into_iter().enumerate() {
                state.durable.insert(ptr as u64, page);
            }
        }
        backend
    }

    /// Fail every write or sync from the `n`th one on (counting from now)
    pub fn fail_after(&self, n: u64) {
        let mut state = self.state.lock();
        state.fail_at = Some(state.ops + n);
    }

    /// Stop injecting faults
    pub fn clear_fault(&self) {
        self.state.lock().fail_at = None;
    }

    /// Writes and syncs issued so far
    pub fn ops(&self) -> u64 {
        self.state.lock().ops
    }

    /// A new backend holding only the synced pages
    pub fn crash(&self) -> Self {
        let state = self.state.lock();
        Self {
            state: Mutex::new(State {
                durable: state.durable.clone(),
                ..State::default()
            }),
        }
    }

    /// Overwrite a durable page directly, bypassing fault accounting
    pub fn corrupt_page(&self, ptr: u64, f: impl FnOnce(&mut Vec<u8>)) {
        let mut state = self.state.lock();
        let page = state
            .durable
            .entry(ptr)
            .or_insert_with(|| vec![0u8; PAGE_SIZE]);
        f(page);
        state.pending.remove(&ptr);
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_page(&self, ptr: u64) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let page = state
            .pending
            .get(&ptr)
            .or_else(|| state.durable.get(&ptr))
            .cloned()
            .unwrap_or_else(|| vec![0u8; PAGE_SIZE]);
        Ok(page)
    }

    fn write_page(&self, ptr: u64, data: &[u8]) -> Result<()> {
        if data.len() != PAGE_SIZE {
            return Err(KvError::Corruption(format!(
                "page image of {} bytes (expected {})",
                data.len(),
                PAGE_SIZE
            )));
        }
        let mut state = self.state.lock();
        state.tick()?;
        state.pending.insert(ptr, data.to_vec());
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.tick()?;
        let pending = std::mem::take(&mut state.pending);
        state.durable.extend(pending);
        Ok(())
    }

    fn page_count(&self) -> Result<u64> {
        Ok(self.state.lock().page_count())
    }
}
