//! Store configuration
//!
//! A store is a primary file path plus the sidecar path `remove` compacts
//! into, and two durability knobs.

use std::path::{Path, PathBuf};

use crate::error::{RecordError, RecordResult};
use crate::format::DEFAULT_TEMP_PATH;

/// How `remove` swaps the compacted sidecar in for the primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplaceMode {
    /// Delete the primary, then rename the sidecar into place.
    ///
    /// Works on filesystems whose rename refuses an existing target, but a
    /// power cut between the two steps loses the whole file.
    #[default]
    DeleteThenRename,
    /// Sync the sidecar, then rename it over the primary without deleting first.
    ///
    /// Needs a filesystem whose rename replaces the target.
    SyncThenRename,
}

/// RecordDB store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Primary store file
    pub path: PathBuf,
    /// Sidecar written during compaction; must not be any store's primary path
    pub temp_path: PathBuf,
    /// Compaction replacement strategy
    pub replace_mode: ReplaceMode,
    /// Sync the file after every append
    pub sync_writes: bool,
}

impl StoreConfig {
    /// Defaults for a store at `path`: `/temp.db` sidecar, delete-then-rename, no sync.
    ///
    /// A store that lives at `/temp.db` itself gets `/temp.db.tmp` as its sidecar.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let temp_path = if path == Path::new(DEFAULT_TEMP_PATH) {
            let mut name = path.clone().into_os_string();
            name.push(".tmp");
            PathBuf::from(name)
        } else {
            PathBuf::from(DEFAULT_TEMP_PATH)
        };
        Self {
            path,
            temp_path,
            replace_mode: ReplaceMode::default(),
            sync_writes: false,
        }
    }

    /// Crash-conscious preset: synced appends and sync-then-rename compaction.
    pub fn durable<P: AsRef<Path>>(path: P) -> Self {
        Self {
            replace_mode: ReplaceMode::SyncThenRename,
            sync_writes: true,
            ..Self::new(path)
        }
    }

    pub fn with_temp_path<P: AsRef<Path>>(mut self, temp_path: P) -> Self {
        self.temp_path = temp_path.as_ref().to_path_buf();
        self
    }

    pub fn with_replace_mode(mut self, mode: ReplaceMode) -> Self {
        self.replace_mode = mode;
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> RecordResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(RecordError::InvalidConfig { reason: "path must not be empty".into() });
        }
        if self.temp_path.as_os_str().is_empty() {
            return Err(RecordError::InvalidConfig { reason: "temp_path must not be empty".into() });
        }
        if self.temp_path == self.path {
            return Err(RecordError::InvalidConfig {
                reason: format!("temp_path {} collides with the store path", self.temp_path.display()),
            });
        }
        Ok(())
    }
}
