//! Compaction: the rewrite behind `remove`
//!
//! The store file has no tombstones, so the only way to drop a record is to
//! copy every other live record into the sidecar file and swap it in:
//!
//! 1. Stream live slots from the store file into the sidecar, skipping the
//!    removed key. Corrupted slots and stray trailing bytes are not copied.
//! 2. If nothing matched, delete the sidecar and leave the store file alone.
//! 3. Otherwise replace the store file with the sidecar per `ReplaceMode`.
//!
//! With `DeleteThenRename` a power cut between the delete and the rename
//! leaves only the sidecar; the records survive there but the store path is
//! empty. `SyncThenRename` never has a moment without a complete store file,
//! provided the filesystem's rename replaces its target.

use std::io::Write;
use std::path::Path;

use log::{debug, warn};

use crate::config::{ReplaceMode, StoreConfig};
use crate::error::{RecordError, RecordResult};
use crate::format::{key_matches, Plain, RecordLayout};
use crate::fs::{FileSystem, OpenMode};
use crate::scan::SlotReader;

/// What a compaction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionResult {
    /// Live records with the removed key
    pub removed: usize,
    /// Live records copied to the sidecar
    pub kept: usize,
    /// Corrupted slots dropped
    pub dropped_corrupt: usize,
    /// Stray trailing bytes dropped
    pub trailing_bytes: usize,
    /// Store file size before the pass
    pub original_bytes: u64,
    /// Sidecar size
    pub compacted_bytes: u64,
    /// Sidecar replaced the store file
    pub replaced: bool,
}

impl CompactionResult {
    /// Bytes reclaimed, zero when the store file was left alone.
    pub fn bytes_saved(&self) -> u64 {
        if self.replaced {
            self.original_bytes.saturating_sub(self.compacted_bytes)
        } else {
            0
        }
    }
}

/// Rewrite the store file without any live record keyed `key`.
///
/// Returns `Ok(None)` when the store file does not exist.
pub fn compact_without<T: Plain, F: FileSystem>(
    fs: &F,
    config: &StoreConfig,
    key: &str,
) -> RecordResult<Option<CompactionResult>> {
    let path = config.path.as_path();
    let temp = config.temp_path.as_path();

    let src = match fs.open(path, OpenMode::Read) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(RecordError::io(path, &e, "Failed to open store for compaction")),
    };
    let mut dst = fs
        .open(temp, OpenMode::WriteTruncate)
        .map_err(|e| RecordError::io(temp, &e, "Failed to create compaction sidecar"))?;

    let mut result = CompactionResult::default();
    let copied = copy_live::<T, F>(fs, config, key, src, &mut dst, &mut result);
    drop(dst);

    if let Err(e) = copied {
        discard_sidecar(fs, temp);
        return Err(e);
    }

    if result.removed == 0 {
        discard_sidecar(fs, temp);
        debug!("compaction of {}: key {:?} not found, store untouched", path.display(), key);
        return Ok(Some(result));
    }

    replace(fs, config)?;
    result.replaced = true;

    debug!(
        "compaction of {}: removed {}, kept {}, dropped {} corrupt, {} -> {} bytes",
        path.display(),
        result.removed,
        result.kept,
        result.dropped_corrupt,
        result.original_bytes,
        result.compacted_bytes
    );
    Ok(Some(result))
}

fn copy_live<T: Plain, F: FileSystem>(
    fs: &F,
    config: &StoreConfig,
    key: &str,
    src: F::File,
    dst: &mut F::File,
    result: &mut CompactionResult,
) -> RecordResult<()> {
    let path = config.path.as_path();
    let temp = config.temp_path.as_path();
    let mut reader = SlotReader::<_, T>::new(src);

    loop {
        let slot = match reader.next_slot() {
            Ok(Some(slot)) => slot,
            Ok(None) => break,
            Err(e) => return Err(RecordError::io(path, &e, "Read failed during compaction")),
        };

        if !slot.live {
            debug!("compaction of {}: dropping corrupt slot at offset {}", path.display(), slot.offset);
            result.dropped_corrupt += 1;
            continue;
        }
        if key_matches(slot.bytes, key) {
            result.removed += 1;
            continue;
        }

        let written = write_record(dst, slot.bytes)
            .map_err(|e| RecordError::io(temp, &e, "Sidecar write failed"))?;
        if written != slot.bytes.len() {
            return Err(RecordError::TornWrite {
                path: temp.to_path_buf(),
                expected_size: slot.bytes.len(),
                written,
            });
        }
        result.kept += 1;
    }

    result.trailing_bytes = reader.trailing_bytes();
    result.original_bytes = reader.offset() + reader.trailing_bytes() as u64;
    result.compacted_bytes = (result.kept * RecordLayout::<T>::SIZE) as u64;

    if result.removed > 0 && config.replace_mode == ReplaceMode::SyncThenRename {
        fs.sync(dst).map_err(|e| RecordError::io(temp, &e, "Failed to sync compaction sidecar"))?;
    }
    Ok(())
}

fn replace<F: FileSystem>(fs: &F, config: &StoreConfig) -> RecordResult<()> {
    let path = config.path.as_path();
    let temp = config.temp_path.as_path();

    match config.replace_mode {
        ReplaceMode::DeleteThenRename => {
            if let Err(e) = fs.remove(path) {
                discard_sidecar(fs, temp);
                return Err(RecordError::io(path, &e, "Failed to delete store before rename"));
            }
            fs.rename(temp, path).map_err(|e| {
                warn!(
                    "rename {} -> {} failed after delete; records are in the sidecar",
                    temp.display(),
                    path.display()
                );
                RecordError::io(path, &e, "Failed to rename sidecar into place")
            })?;
        }
        ReplaceMode::SyncThenRename => {
            fs.rename(temp, path)
                .map_err(|e| RecordError::io(path, &e, "Failed to rename sidecar over store"))?;
            fs.sync_dir(path)
                .map_err(|e| RecordError::io(path, &e, "Failed to sync directory after rename"))?;
        }
    }
    Ok(())
}

fn discard_sidecar<F: FileSystem>(fs: &F, temp: &Path) {
    if let Err(e) = fs.remove(temp) {
        debug!("could not remove sidecar {}: {}", temp.display(), e);
    }
}

/// Write `buf` with repeated `write` calls until done or the file stops
/// accepting bytes. Returns bytes transferred.
pub fn write_record<W: Write>(file: &mut W, buf: &[u8]) -> std::io::Result<usize> {
    let mut written = 0;
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}
