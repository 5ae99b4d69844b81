//! Serialized access to one store from several threads or tasks.
//!
//! `RecordStore` has no locking and two overlapping `insert`/`remove` calls
//! on the same path can lose data. `SharedRecordStore` puts every call behind
//! one mutex. Clones share the lock, so hand a clone to each user of the path.

use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::compaction::CompactionResult;
use crate::error::RecordResult;
use crate::format::Plain;
use crate::fs::{FileSystem, StdFileSystem};
use crate::store::RecordStore;
use crate::verify::IntegrityReport;

/// A `RecordStore` behind a shared mutex.
pub struct SharedRecordStore<T: Plain, F: FileSystem = StdFileSystem> {
    inner: Arc<Mutex<RecordStore<T, F>>>,
}

impl<T: Plain, F: FileSystem> Clone for SharedRecordStore<T, F> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Plain, F: FileSystem> SharedRecordStore<T, F> {
    pub fn new(store: RecordStore<T, F>) -> Self {
        Self { inner: Arc::new(Mutex::new(store)) }
    }

    /// Run several operations under one lock hold, e.g. read-modify-write.
    pub fn with_store<R>(&self, f: impl FnOnce(&RecordStore<T, F>) -> R) -> R {
        let store = self.inner.lock();
        f(&store)
    }

    pub fn insert(&self, key: &str, value: &T) -> bool {
        self.inner.lock().insert(key, value)
    }

    pub fn query(&self, key: &str) -> Option<T> {
        self.inner.lock().query(key)
    }

    pub fn exists(&self, key: &str) -> bool {
        self.inner.lock().exists(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    pub fn count(&self) -> usize {
        self.inner.lock().count()
    }

    /// The visitor runs with the lock held; it must not call back into this store.
    pub fn iterate<V>(&self, visitor: V)
    where
        V: FnMut(&str, T),
    {
        self.inner.lock().iterate(visitor)
    }

    pub fn clear(&self) {
        self.inner.lock().clear()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().keys()
    }

    pub fn entries(&self) -> Vec<(String, T)> {
        self.inner.lock().entries()
    }

    pub fn try_insert(&self, key: &str, value: &T) -> RecordResult<()> {
        self.inner.lock().try_insert(key, value)
    }

    pub fn try_query(&self, key: &str) -> RecordResult<Option<T>> {
        self.inner.lock().try_query(key)
    }

    pub fn try_remove(&self, key: &str) -> RecordResult<bool> {
        self.inner.lock().try_remove(key)
    }

    pub fn compact(&self, key: &str) -> RecordResult<Option<CompactionResult>> {
        self.inner.lock().compact(key)
    }

    pub fn try_count(&self) -> RecordResult<usize> {
        self.inner.lock().try_count()
    }

    /// Same locking rule as `iterate`.
    pub fn try_for_each<V>(&self, visitor: V) -> RecordResult<()>
    where
        V: FnMut(&str, T) -> ControlFlow<()>,
    {
        self.inner.lock().try_for_each(visitor)
    }

    pub fn try_clear(&self) -> RecordResult<()> {
        self.inner.lock().try_clear()
    }

    pub fn verify(&self) -> RecordResult<IntegrityReport> {
        self.inner.lock().verify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::MemFileSystem;
    use std::thread;

    #[test]
    fn test_concurrent_writers_serialized() {
        let fs = MemFileSystem::new();
        let shared = SharedRecordStore::new(RecordStore::<u64, _>::new(fs.clone(), "/data.db"));

        let mut handles = vec![];
        for t in 0..4u64 {
            let s = shared.clone();
            handles.push(thread::spawn(move || {
                for i in 0..25u64 {
                    let key = format!("t{}-{}", t, i % 5);
                    assert!(s.insert(&key, &(t * 100 + i)));
                    if i % 7 == 0 {
                        s.remove(&key);
                    }
                }
            }));
        }
        for h in handles { h.join().unwrap(); }

        let report = shared.verify().unwrap();
        assert!(report.is_clean(), "serialized writers must not corrupt: {:?}", report);
        assert_eq!(report.live_slots, shared.count());
    }

    #[test]
    fn test_with_store_read_modify_write() {
        let fs = MemFileSystem::new();
        let shared = SharedRecordStore::new(RecordStore::<u32, _>::new(fs, "/counter.db"));

        let mut handles = vec![];
        for _ in 0..4 {
            let s = shared.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10 {
                    s.with_store(|store| {
                        let n = store.query("boots").unwrap_or(0);
                        assert!(store.insert("boots", &(n + 1)));
                    });
                }
            }));
        }
        for h in handles { h.join().unwrap(); }

        assert_eq!(shared.query("boots"), Some(40));
        assert_eq!(shared.count(), 1);
    }

    #[test]
    fn test_error_surface_forwarded() {
        let fs = MemFileSystem::new();
        let shared = SharedRecordStore::new(RecordStore::<u16, _>::new(fs.clone(), "/ids.db"));

        for (k, v) in [("a", 1u16), ("b", 2), ("c", 3)] {
            shared.try_insert(k, &v).unwrap();
        }
        assert_eq!(shared.try_query("b").unwrap(), Some(2));
        assert_eq!(shared.try_count().unwrap(), 3);
        assert_eq!(shared.keys(), vec!["a", "b", "c"]);

        let stats = shared.compact("a").unwrap().unwrap();
        assert_eq!((stats.removed, stats.kept), (1, 2));
        assert_eq!(shared.entries(), vec![("b".to_string(), 2), ("c".to_string(), 3)]);

        let mut first = None;
        shared
            .try_for_each(|k, v| {
                first = Some((k.to_string(), v));
                ControlFlow::Break(())
            })
            .unwrap();
        assert_eq!(first, Some(("b".to_string(), 2)));

        shared.try_clear().unwrap();
        assert_eq!(shared.try_count().unwrap(), 0);
        assert!(fs.paths().is_empty());
    }
}
