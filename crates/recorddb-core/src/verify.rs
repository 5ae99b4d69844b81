//! Read-only integrity scan.
//!
//! Normal reads hide corrupted slots. `verify` walks the same file and says
//! what it hid, without modifying anything.

use hashbrown::HashSet;
use log::debug;

use crate::error::{RecordError, RecordResult};
use crate::format::{slot_key, Plain, RecordLayout};
use crate::fs::{FileSystem, OpenMode};
use crate::scan::SlotReader;
use crate::config::StoreConfig;

/// Result of an integrity scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// The store file exists
    pub file_exists: bool,
    /// Bytes per slot for this payload type
    pub record_size: usize,
    /// Full slots in the file
    pub total_slots: usize,
    /// Slots whose checksum matched
    pub live_slots: usize,
    /// Offsets of slots whose checksum did not match
    pub corrupt_offsets: Vec<u64>,
    /// Bytes of an incomplete slot at the end of the file
    pub trailing_bytes: usize,
    /// Keys held by more than one live slot, in first-repeat order
    pub duplicate_keys: Vec<String>,
}

impl IntegrityReport {
    /// No corruption, no stray tail, no duplicates.
    pub fn is_clean(&self) -> bool {
        self.corrupt_offsets.is_empty() && self.trailing_bytes == 0 && self.duplicate_keys.is_empty()
    }

    /// File size implied by the scan.
    pub fn file_bytes(&self) -> u64 {
        (self.total_slots * self.record_size + self.trailing_bytes) as u64
    }
}

pub fn verify_file<T: Plain, F: FileSystem>(fs: &F, config: &StoreConfig) -> RecordResult<IntegrityReport> {
    let path = config.path.as_path();
    let mut report = IntegrityReport {
        record_size: RecordLayout::<T>::SIZE,
        ..IntegrityReport::default()
    };

    let file = match fs.open(path, OpenMode::Read) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(RecordError::io(path, &e, "Failed to open store for verify")),
    };
    report.file_exists = true;

    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    let mut reported: HashSet<Vec<u8>> = HashSet::new();
    let mut reader = SlotReader::<_, T>::new(file);

    while let Some(slot) = reader
        .next_slot()
        .map_err(|e| RecordError::io(path, &e, "Read failed during verify"))?
    {
        report.total_slots += 1;
        if !slot.live {
            report.corrupt_offsets.push(slot.offset);
            continue;
        }
        report.live_slots += 1;

        let key = slot_key(slot.bytes);
        if !seen.insert(key.to_vec()) && reported.insert(key.to_vec()) {
            report.duplicate_keys.push(String::from_utf8_lossy(key).into_owned());
        }
    }
    report.trailing_bytes = reader.trailing_bytes();

    debug!(
        "verify {}: {} slots, {} live, {} corrupt, {} trailing bytes",
        path.display(),
        report.total_slots,
        report.live_slots,
        report.corrupt_offsets.len(),
        report.trailing_bytes
    );
    Ok(report)
}
