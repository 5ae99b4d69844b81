//! In-memory flash simulator
//!
//! `MemFileSystem` keeps every file as a byte vector behind one shared lock.
//! Writes land immediately, the way a raw flash filesystem without a page
//! cache behaves, so a short write leaves exactly the bytes a power cut would.
//!
//! Faults can be injected to exercise the store's failure paths:
//! - a write budget, after which writes transfer nothing
//! - failing renames
//! - read-only media (append and truncate opens fail)
//! - SPIFFS-style rename that refuses an existing target

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::fs::{FileSystem, OpenMode};

#[derive(Debug, Default)]
struct MemState {
    files: HashMap<PathBuf, Vec<u8>>,
    /// Bytes still allowed to be written; None is unlimited
    write_budget: Option<usize>,
    fail_rename: bool,
    /// Deleting this path fails; other deletes succeed
    fail_remove: Option<PathBuf>,
    read_only: bool,
    rename_replaces: bool,
    syncs: u64,
}

/// Shared in-memory filesystem. Clones see the same files.
#[derive(Debug, Clone)]
pub struct MemFileSystem {
    state: Arc<Mutex<MemState>>,
}

impl Default for MemFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemFileSystem {
    /// Empty filesystem whose rename replaces an existing target.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemState { rename_replaces: true, ..MemState::default() })),
        }
    }

    /// Empty filesystem whose rename fails when the target exists, like SPIFFS.
    pub fn spiffs_like() -> Self {
        let fs = Self::new();
        fs.state.lock().rename_replaces = false;
        fs
    }

    /// Limit the total bytes further writes may transfer. None lifts the limit.
    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.state.lock().write_budget = budget;
    }

    pub fn set_fail_rename(&self, fail: bool) {
        self.state.lock().fail_rename = fail;
    }

    /// Make every delete of `path` fail with PermissionDenied. None clears it.
    pub fn set_fail_remove<P: AsRef<Path>>(&self, path: Option<P>) {
        self.state.lock().fail_remove = path.map(|p| p.as_ref().to_path_buf());
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.state.lock().read_only = read_only;
    }

    /// Snapshot of a file's bytes.
    pub fn contents<P: AsRef<Path>>(&self, path: P) -> Option<Vec<u8>> {
        self.state.lock().files.get(path.as_ref()).cloned()
    }

    /// Replace a file's bytes wholesale.
    pub fn set_contents<P: AsRef<Path>>(&self, path: P, bytes: Vec<u8>) {
        self.state.lock().files.insert(path.as_ref().to_path_buf(), bytes);
    }

    /// XOR one byte of a file. Returns false if the file or offset does not exist.
    pub fn flip_byte<P: AsRef<Path>>(&self, path: P, offset: usize, mask: u8) -> bool {
        let mut state = self.state.lock();
        match state.files.get_mut(path.as_ref()).and_then(|f| f.get_mut(offset)) {
            Some(b) => {
                *b ^= mask;
                true
            }
            None => false,
        }
    }

    /// Sorted list of file paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state.lock().files.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of `sync` calls served.
    pub fn sync_count(&self) -> u64 {
        self.state.lock().syncs
    }
}

/// Open handle into a `MemFileSystem` file.
#[derive(Debug)]
pub struct MemFile {
    state: Arc<Mutex<MemState>>,
    path: PathBuf,
    mode: OpenMode,
    pos: usize,
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.mode != OpenMode::Read {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file not opened for reading"));
        }
        let state = self.state.lock();
        let data = match state.files.get(&self.path) {
            Some(data) => data,
            None => return Ok(0),
        };
        let start = self.pos.min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos = start + n;
        Ok(n)
    }
}

impl Write for MemFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mode == OpenMode::Read {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file not opened for writing"));
        }
        let mut state = self.state.lock();
        let n = match state.write_budget {
            Some(budget) => buf.len().min(budget),
            None => buf.len(),
        };
        if let Some(budget) = state.write_budget.as_mut() {
            *budget -= n;
        }
        let data = state.files.entry(self.path.clone()).or_default();
        match self.mode {
            OpenMode::Append => data.extend_from_slice(&buf[..n]),
            _ => {
                if data.len() < self.pos {
                    data.resize(self.pos, 0);
                }
                let overlap = (data.len() - self.pos).min(n);
                data[self.pos..self.pos + overlap].copy_from_slice(&buf[..overlap]);
                data.extend_from_slice(&buf[overlap..n]);
                self.pos += n;
            }
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileSystem for MemFileSystem {
    type File = MemFile;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<MemFile> {
        let mut state = self.state.lock();
        match mode {
            OpenMode::Read => {
                if !state.files.contains_key(path) {
                    return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display())));
                }
            }
            OpenMode::Append | OpenMode::WriteTruncate if state.read_only => {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only media"));
            }
            OpenMode::Append => {
                state.files.entry(path.to_path_buf()).or_default();
            }
            OpenMode::WriteTruncate => {
                state.files.insert(path.to_path_buf(), Vec::new());
            }
        }
        Ok(MemFile {
            state: Arc::clone(&self.state),
            path: path.to_path_buf(),
            mode,
            pos: 0,
        })
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_remove.as_deref() == Some(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected delete failure"));
        }
        match state.files.remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", path.display()))),
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.fail_rename {
            return Err(io::Error::new(io::ErrorKind::Other, "injected rename failure"));
        }
        if !state.rename_replaces && state.files.contains_key(to) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, format!("{} exists", to.display())));
        }
        let data = state
            .files
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} not found", from.display())))?;
        state.files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn sync(&self, _file: &mut MemFile) -> io::Result<()> {
        self.state.lock().syncs += 1;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.state.lock().files.contains_key(path)
    }
}
