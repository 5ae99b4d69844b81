//! Property tests: the store against an in-memory model.
//!
//! The model is the list of live (key, value) pairs in file order. Every
//! insert moves its key to the end; every remove drops it.

use proptest::prelude::*;

use recorddb_core::{MemFileSystem, RecordStore, MAX_KEY_LEN};

const PATH: &str = "/data.db";

#[derive(Debug, Clone)]
enum Op {
    Insert(String, u32),
    Remove(String),
    Clear,
}

fn key_strategy() -> impl Strategy<Value = String> {
    // Small alphabet so keys collide and replacement paths are exercised
    "[a-e]{1,3}"
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (key_strategy(), any::<u32>()).prop_map(|(k, v)| Op::Insert(k, v)),
        3 => key_strategy().prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

fn apply(model: &mut Vec<(String, u32)>, op: &Op) -> bool {
    match op {
        Op::Insert(k, v) => {
            model.retain(|(mk, _)| mk != k);
            model.push((k.clone(), *v));
            true
        }
        Op::Remove(k) => {
            let before = model.len();
            model.retain(|(mk, _)| mk != k);
            model.len() != before
        }
        Op::Clear => {
            model.clear();
            true
        }
    }
}

proptest! {
    #[test]
    fn prop_store_matches_model(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let fs = MemFileSystem::new();
        let store: RecordStore<u32, _> = RecordStore::new(fs.clone(), PATH);
        let mut model = Vec::new();
        let mut inserts = 0usize;
        let mut removes = 0usize;

        for op in &ops {
            let expected = apply(&mut model, op);
            match op {
                Op::Insert(k, v) => {
                    prop_assert!(store.insert(k, v));
                    prop_assert_eq!(store.query(k), Some(*v));
                    inserts += 1;
                }
                Op::Remove(k) => {
                    let before = fs.contents(PATH);
                    let removed = store.remove(k);
                    prop_assert_eq!(removed, expected);
                    if removed {
                        removes += 1;
                        prop_assert_eq!(store.query(k), None);
                    } else {
                        prop_assert_eq!(fs.contents(PATH), before);
                    }
                }
                Op::Clear => {
                    store.clear();
                    inserts = 0;
                    removes = 0;
                    prop_assert!(fs.contents(PATH).is_none());
                }
            }
            prop_assert_eq!(store.entries(), model.clone());
            prop_assert_eq!(store.count(), model.len());
        }

        // Each successful insert adds a key or replaces one; replacement is an
        // implicit successful remove, so count never exceeds inserts - removes.
        prop_assert!(store.count() <= inserts - removes);
        prop_assert!(store.verify().unwrap().is_clean());
    }

    #[test]
    fn prop_insert_then_query(key in "[ -~]{0,31}", value in any::<[u16; 4]>()) {
        prop_assume!(!key.contains('\0'));
        let store: RecordStore<[u16; 4], _> = RecordStore::new(MemFileSystem::new(), PATH);
        prop_assert!(store.insert(&key, &value));
        prop_assert_eq!(store.query(&key), Some(value));
        prop_assert!(store.exists(&key));
    }

    #[test]
    fn prop_long_keys_rejected(extra in 0usize..40, value in any::<u32>()) {
        let fs = MemFileSystem::new();
        let store: RecordStore<u32, _> = RecordStore::new(fs.clone(), PATH);
        prop_assert!(store.insert("seed", &1));
        let before = fs.contents(PATH);

        let key = "k".repeat(MAX_KEY_LEN + 1 + extra);
        prop_assert!(!store.insert(&key, &value));
        prop_assert_eq!(fs.contents(PATH), before);
    }

    #[test]
    fn prop_flip_hides_one_record(
        n in 2usize..8,
        victim_seed in any::<usize>(),
        byte_seed in any::<usize>(),
        bit in 0u8..8,
    ) {
        let fs = MemFileSystem::new();
        let store: RecordStore<u32, _> = RecordStore::new(fs.clone(), PATH);
        for i in 0..n {
            let key = format!("key{}", i);
            prop_assert!(store.insert(&key, &(i as u32)));
        }

        let size = RecordStore::<u32, MemFileSystem>::record_size();
        let victim = victim_seed % n;
        // Any byte but the checksum itself
        let offset = victim * size + byte_seed % (size - 1);
        prop_assert!(fs.flip_byte(PATH, offset, 1 << bit));

        prop_assert_eq!(store.count(), n - 1);
        let victim_key = format!("key{}", victim);
        prop_assert_eq!(store.query(&victim_key), None);
        for i in (0..n).filter(|&i| i != victim) {
            let key = format!("key{}", i);
            prop_assert_eq!(store.query(&key), Some(i as u32));
        }
        let mut visited = 0;
        store.iterate(|k, _| {
            assert_ne!(k, victim_key);
            visited += 1;
        });
        prop_assert_eq!(visited, n - 1);
    }
}

#[test]
fn test_count_tracks_inserts_minus_removes() {
    let store: RecordStore<u32, _> = RecordStore::new(MemFileSystem::new(), PATH);
    let keys: Vec<String> = (0..20).map(|i| format!("k{:02}", i)).collect();
    for (i, k) in keys.iter().enumerate() {
        assert!(store.insert(k, &(i as u32)));
    }
    for k in keys.iter().step_by(3) {
        assert!(store.remove(k));
    }
    assert_eq!(store.count(), 20 - 7);
}
