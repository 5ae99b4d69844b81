//! RecordStore: keyed fixed-size records in one flat file.
//!
//! Every call is a fresh pass over the file: there is no index, no cache and
//! no handle kept between calls.
//!
//! **Write path**: remove any live record with the key (full rewrite), then
//! append one record.
//! **Read path**: linear scan, first live slot with the key wins.
//! **Corruption**: a slot whose CRC-8 does not match is invisible to reads and
//! dropped by the next compaction.
//!
//! `RecordStore` does no locking. Overlapping `insert`/`remove` calls on the
//! same path corrupt the file; use `SharedRecordStore` or an outer lock.

use std::borrow::Cow;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::path::Path;

use log::{debug, warn};

use crate::compaction::{compact_without, write_record, CompactionResult};
use crate::config::StoreConfig;
use crate::error::{RecordError, RecordResult};
use crate::format::{decode_payload, key_matches, serialize_record, slot_key, validate_key, Plain, RecordLayout};
use crate::fs::{FileSystem, OpenMode, StdFileSystem};
use crate::scan::SlotReader;
use crate::verify::{verify_file, IntegrityReport};

/// Fixed-size record store over a `FileSystem`.
#[derive(Debug, Clone)]
pub struct RecordStore<T: Plain, F: FileSystem = StdFileSystem> {
    fs: F,
    config: StoreConfig,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Plain, F: FileSystem> RecordStore<T, F> {
    /// Store at `path` with the default configuration, which always validates.
    pub fn new<P: AsRef<Path>>(fs: F, path: P) -> Self {
        Self {
            fs,
            config: StoreConfig::new(path),
            _payload: PhantomData,
        }
    }

    /// Store with a validated configuration. Touches no files.
    pub fn open(fs: F, config: StoreConfig) -> RecordResult<Self> {
        config.validate()?;
        Ok(Self { fs, config, _payload: PhantomData })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn filesystem(&self) -> &F {
        &self.fs
    }

    /// Bytes per record slot for `T`.
    pub const fn record_size() -> usize {
        RecordLayout::<T>::SIZE
    }

    // ------------------------------------------------------------------
    // Default surface: booleans and options, failures logged and collapsed
    // ------------------------------------------------------------------

    /// Insert or replace. False on a rejected key or any I/O failure.
    ///
    /// A failed append after the old record was removed leaves the key absent.
    pub fn insert(&self, key: &str, value: &T) -> bool {
        match self.try_insert(key, value) {
            Ok(()) => true,
            Err(e @ RecordError::InvalidKey { .. }) => {
                debug!("insert into {} rejected: {}", self.path().display(), e);
                false
            }
            Err(e) => {
                warn!("insert of {:?} into {} failed: {}", key, self.path().display(), e);
                false
            }
        }
    }

    /// Value of the first live record with `key`.
    ///
    /// A read error ends the scan like end of file does.
    pub fn query(&self, key: &str) -> Option<T> {
        if validate_key(key).is_err() {
            return None;
        }
        let mut found = None;
        let _ = self.scan_live(false, |slot| {
            if key_matches(slot, key) {
                found = Some(decode_payload::<T>(slot));
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        found
    }

    pub fn exists(&self, key: &str) -> bool {
        self.query(key).is_some()
    }

    /// Remove the record with `key`, compacting the file. False when absent or on failure.
    pub fn remove(&self, key: &str) -> bool {
        match self.try_remove(key) {
            Ok(found) => found,
            Err(e) => {
                warn!("remove of {:?} from {} failed: {}", key, self.path().display(), e);
                false
            }
        }
    }

    /// Number of live records.
    pub fn count(&self) -> usize {
        let mut n = 0;
        let _ = self.scan_live(false, |_| {
            n += 1;
            ControlFlow::Continue(())
        });
        n
    }

    /// Call `visitor` with every live record in file order.
    pub fn iterate<V>(&self, mut visitor: V)
    where
        V: FnMut(&str, T),
    {
        let _ = self.scan_live(false, |slot| {
            visitor(&key_str(slot), decode_payload::<T>(slot));
            ControlFlow::Continue(())
        });
    }

    /// Delete the store file.
    pub fn clear(&self) {
        if let Err(e) = self.try_clear() {
            warn!("clear of {} failed: {}", self.path().display(), e);
        }
    }

    /// Live keys in file order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.iterate(|k, _| keys.push(k.to_string()));
        keys
    }

    /// Live records in file order.
    pub fn entries(&self) -> Vec<(String, T)> {
        let mut entries = Vec::new();
        self.iterate(|k, v| entries.push((k.to_string(), v)));
        entries
    }

    // ------------------------------------------------------------------
    // Error-reporting surface
    // ------------------------------------------------------------------

    /// Insert or replace, reporting why it failed.
    pub fn try_insert(&self, key: &str, value: &T) -> RecordResult<()> {
        let record = serialize_record(key, value)?;

        self.try_remove(key)?;

        let path = self.path();
        let mut file = self
            .fs
            .open(path, OpenMode::Append)
            .map_err(|e| RecordError::io(path, &e, "Failed to open store for append"))?;

        let written = write_record(&mut file, &record)
            .map_err(|e| RecordError::io(path, &e, "Append failed"))?;
        if written != record.len() {
            return Err(RecordError::TornWrite {
                path: path.to_path_buf(),
                expected_size: record.len(),
                written,
            });
        }

        if self.config.sync_writes {
            self.fs
                .sync(&mut file)
                .map_err(|e| RecordError::io(path, &e, "Failed to sync after append"))?;
        }
        Ok(())
    }

    /// Look up `key`. Read errors are reported instead of ending the scan.
    pub fn try_query(&self, key: &str) -> RecordResult<Option<T>> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        let mut found = None;
        self.scan_live(true, |slot| {
            if key_matches(slot, key) {
                found = Some(decode_payload::<T>(slot));
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(found)
    }

    /// Remove `key`. `Ok(false)` when the key or the file is absent.
    pub fn try_remove(&self, key: &str) -> RecordResult<bool> {
        Ok(self.compact(key)?.map_or(false, |r| r.removed > 0))
    }

    /// Run the compaction behind `remove` and return its statistics.
    ///
    /// `Ok(None)` when the key cannot exist or the file is absent.
    pub fn compact(&self, key: &str) -> RecordResult<Option<CompactionResult>> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        compact_without::<T, F>(&self.fs, &self.config, key)
    }

    pub fn try_count(&self) -> RecordResult<usize> {
        let mut n = 0;
        self.scan_live(true, |_| {
            n += 1;
            ControlFlow::Continue(())
        })?;
        Ok(n)
    }

    /// Visit live records in file order; the visitor may stop early with `Break`.
    pub fn try_for_each<V>(&self, mut visitor: V) -> RecordResult<()>
    where
        V: FnMut(&str, T) -> ControlFlow<()>,
    {
        self.scan_live(true, |slot| visitor(&key_str(slot), decode_payload::<T>(slot)))
    }

    /// Delete the store file. A missing file is not an error.
    pub fn try_clear(&self) -> RecordResult<()> {
        let path = self.path();
        match self.fs.remove(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecordError::io(path, &e, "Failed to delete store")),
        }
    }

    /// Report corrupted slots, stray trailing bytes and duplicate keys.
    pub fn verify(&self) -> RecordResult<IntegrityReport> {
        verify_file::<T, F>(&self.fs, &self.config)
    }

    /// Feed every live slot to `f` until it breaks.
    ///
    /// A missing file is an empty store. With `strict` false a read error
    /// ends the scan silently, otherwise it is returned.
    fn scan_live<V>(&self, strict: bool, mut f: V) -> RecordResult<()>
    where
        V: FnMut(&[u8]) -> ControlFlow<()>,
    {
        let path = self.path();
        let file = match self.fs.open(path, OpenMode::Read) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if strict => return Err(RecordError::io(path, &e, "Failed to open store for read")),
            Err(e) => {
                debug!("open {} for read failed: {}", path.display(), e);
                return Ok(());
            }
        };

        let mut reader = SlotReader::<_, T>::new(file);
        loop {
            let slot = match reader.next_slot() {
                Ok(Some(slot)) => slot,
                Ok(None) => break,
                Err(e) if strict => return Err(RecordError::io(path, &e, "Read failed")),
                Err(e) => {
                    debug!("read of {} stopped early: {}", path.display(), e);
                    break;
                }
            };
            if !slot.live {
                debug!("{}: skipping corrupt slot at offset {}", path.display(), slot.offset);
                continue;
            }
            if f(slot.bytes).is_break() {
                break;
            }
        }
        Ok(())
    }
}

fn key_str(slot: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(slot_key(slot))
}
