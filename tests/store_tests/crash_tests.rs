//! Crash safety tests
//!
//! These tests verify:
//! - A fault at any write or sync of a commit leaves the durable state at
//!   the previous commit, and the live store keeps serving that state
//! - A commit that returned Ok survives a crash
//! - A torn meta slot falls back to the previous transaction intact
//! - A store keeps committing correctly after failed commits

use std::collections::BTreeMap;

use cowkv::btree::node::PAGE_SIZE;
use cowkv::storage::{InMemoryBackend, StorageBackend};
use cowkv::{Config, Store};

// =============================================================================
// Helper Functions
// =============================================================================

type Model = BTreeMap<Vec<u8>, Vec<u8>>;

fn config() -> Config {
    Config::default()
}

fn key(i: u32) -> Vec<u8> {
    format!("key{:05}", i).into_bytes()
}

/// A store with a multi-level tree and a non-empty free list
fn populated() -> (Store<InMemoryBackend>, Model) {
    let store = Store::with_backend(InMemoryBackend::new(), &config()).unwrap();
    let mut model = Model::new();
    for i in 0..400 {
        let val = vec![(i % 200) as u8; 60];
        store.set(&key(i), &val).unwrap();
        model.insert(key(i), val);
    }
    for i in (0..400).step_by(4) {
        store.del(&key(i)).unwrap();
        model.remove(&key(i));
    }
    (store, model)
}

fn reopen(backend: InMemoryBackend) -> Store<InMemoryBackend> {
    Store::with_backend(backend, &config()).unwrap()
}

fn assert_matches(store: &Store<InMemoryBackend>, model: &Model) {
    store.verify().unwrap();
    let entries = store
        .iter()
        .unwrap()
        .collect::<cowkv::Result<Vec<_>>>()
        .unwrap();
    let expected: Vec<_> = model.clone().into_iter().collect();
    assert_eq!(entries, expected);
}

/// Apply one mutation to the model the way the store would
fn apply(model: &mut Model, op: &Op) {
    match op {
        Op::Set(k, v) => {
            model.insert(k.clone(), v.clone());
        }
        Op::Del(k) => {
            model.remove(k);
        }
    }
}

enum Op {
    Set(Vec<u8>, Vec<u8>),
    Del(Vec<u8>),
}

fn run(store: &Store<InMemoryBackend>, op: &Op) -> cowkv::Result<()> {
    match op {
        Op::Set(k, v) => store.set(k, v),
        Op::Del(k) => store.del(k).map(|_| ()),
    }
}

/// Fail the commit of `op` at every possible operation index
///
/// Returns how many fault points were exercised before the commit succeeded.
fn fault_every_step(op: Op) -> u64 {
    let mut step = 0;
    loop {
        let (store, model) = populated();
        let txid = store.stats().txid;

        store.backend().fail_after(step);
        let result = run(&store, &op);
        store.backend().clear_fault();

        let mut expected = model.clone();
        if result.is_ok() {
            apply(&mut expected, &op);
        }

        // the live store serves the last committed state
        assert_matches(&store, &expected);

        // so does the store recovered from durable pages
        let recovered = reopen(store.backend().crash());
        assert_matches(&recovered, &expected);

        if result.is_ok() {
            assert_eq!(recovered.stats().txid, txid + 1);
            return step;
        }
        assert_eq!(recovered.stats().txid, txid);
        step += 1;
    }
}

// =============================================================================
// Fault Injection Tests
// =============================================================================

#[test]
fn test_fault_at_every_step_of_insert() {
    let steps = fault_every_step(Op::Set(key(1001), vec![7u8; 60]));
    // at least one page, sync, meta, sync
    assert!(steps >= 4);
}

#[test]
fn test_fault_at_every_step_of_update() {
    let steps = fault_every_step(Op::Set(key(5), vec![9u8; 500]));
    assert!(steps >= 4);
}

#[test]
fn test_fault_at_every_step_of_delete() {
    let steps = fault_every_step(Op::Del(key(9)));
    assert!(steps >= 4);
}

#[test]
fn test_commits_after_failed_commit_survive_crash() {
    let (store, _model) = populated();

    // faults at every step, including after the meta write
    for step in 0..12 {
        store.backend().fail_after(step);
        let _ = store.set(&key(2000 + step as u32), b"lost?");
        store.backend().clear_fault();
    }
    let live = store.iter().unwrap().count();

    for i in 0..50 {
        store.set(&key(3000 + i), &vec![i as u8; 80]).unwrap();
    }

    // failed sets that reported an error never appear; later ones are durable
    let recovered = reopen(store.backend().crash());
    recovered.verify().unwrap();
    for i in 0..50 {
        assert_eq!(
            recovered.get(&key(3000 + i)).unwrap(),
            Some(vec![i as u8; 80])
        );
    }
    assert_eq!(recovered.iter().unwrap().count(), live + 50);
    assert_eq!(recovered.stats(), store.stats());
}

#[test]
fn test_many_failures_do_not_leak_pages() {
    let (store, mut model) = populated();

    for round in 0..30u32 {
        store.backend().fail_after((round % 7) as u64);
        let op = Op::Set(key(round % 50), vec![round as u8; 120]);
        if run(&store, &op).is_ok() {
            apply(&mut model, &op);
        }
        store.backend().clear_fault();
        let op = Op::Del(key(round * 3 + 1));
        run(&store, &op).unwrap();
        apply(&mut model, &op);
    }

    assert_matches(&store, &model);
    assert_matches(&reopen(store.backend().crash()), &model);
}

// =============================================================================
// Torn Meta Tests
// =============================================================================

#[test]
fn test_torn_meta_falls_back_to_previous_commit() {
    let (store, mut before) = populated();
    let previous = store.stats();

    store.set(b"newest", b"value").unwrap();
    let latest = store.stats();
    assert_eq!(latest.txid, previous.txid + 1);

    // tear the slot the latest commit wrote
    let backend = store.backend().crash();
    backend.corrupt_page(latest.txid % 2, |page| page[40] ^= 0xFF);

    let recovered = reopen(backend);
    assert_eq!(recovered.stats(), previous);
    assert_eq!(recovered.get(b"newest").unwrap(), None);
    assert_matches(&recovered, &before);

    // and the recovered store commits on top of it
    recovered.set(b"after", b"torn").unwrap();
    before.insert(b"after".to_vec(), b"torn".to_vec());
    assert_matches(&reopen(recovered.backend().crash()), &before);
}

#[test]
fn test_both_meta_slots_torn_is_corruption() {
    let (store, _model) = populated();
    let backend = store.backend().crash();
    backend.corrupt_page(0, |page| page[20] ^= 0x01);
    backend.corrupt_page(1, |page| page[20] ^= 0x01);

    let result = Store::with_backend(backend, &config());
    assert!(matches!(result, Err(cowkv::KvError::Corruption(_))));
}

#[test]
fn test_truncated_backend_is_corruption() {
    let (store, _model) = populated();
    let stats = store.stats();

    // keep only the meta slots
    let backend = InMemoryBackend::new();
    for ptr in 0..2 {
        let page = store.backend().read_page(ptr).unwrap();
        backend.corrupt_page(ptr, |slot| slot.copy_from_slice(&page));
    }
    assert!(stats.page_count > 2);
    assert_eq!(backend.read_page(5).unwrap(), vec![0u8; PAGE_SIZE]);

    let result = Store::with_backend(backend, &config());
    assert!(matches!(result, Err(cowkv::KvError::Corruption(_))));
}
