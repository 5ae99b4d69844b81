//! RecordDB Core: fixed-size keyed records for flash filesystems
//!
//! A record store keeps values of one plain-data type `T` under short string
//! keys, in a single flat file of fixed-size slots:
//!
//! `[32-byte key][size_of::<T>() payload][CRC-8]`, repeated, no header.
//!
//! # Architecture
//!
//! - **Read path**: linear scan, slots failing their CRC-8 are invisible
//! - **Write path**: remove the old record by compaction, then append
//! - **Compaction**: copy live records to a sidecar file and swap it in
//!
//! Nothing is cached between calls and no file handle outlives a call, so a
//! store survives any number of power cycles between operations.
//!
//! ```no_run
//! use recorddb_core::{RecordStore, StdFileSystem};
//!
//! let store: RecordStore<u32> = RecordStore::new(StdFileSystem::new("/mnt/flash"), "/boots.db");
//! let boots = store.query("boots").unwrap_or(0);
//! store.insert("boots", &(boots + 1));
//! ```

pub mod checksum;
pub mod compaction;
pub mod config;
pub mod error;
pub mod format;
pub mod fs;
pub mod memfs;
pub mod platform_durability;
pub mod scan;
pub mod shared;
pub mod store;
pub mod verify;

// Re-export key types for convenience
pub use compaction::CompactionResult;
pub use config::{ReplaceMode, StoreConfig};
pub use error::{RecordError, RecordResult};
pub use format::{Plain, RecordLayout, KEY_CAPACITY, MAX_KEY_LEN};
pub use fs::{FileSystem, OpenMode, StdFileSystem};
pub use memfs::MemFileSystem;
pub use shared::SharedRecordStore;
pub use store::RecordStore;
pub use verify::IntegrityReport;
