//! Filesystem collaborator
//!
//! The store never holds a handle between calls. Every operation opens what
//! it needs through `FileSystem::open`, and closing is dropping the handle, so
//! release happens on every return path including `?`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};

use crate::platform_durability::{durable_sync, sync_parent_dir};

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Write at the end, creating the file if needed
    Append,
    /// Sequential read from the start
    Read,
    /// Create or truncate, then write from the start
    WriteTruncate,
}

/// Byte-stream filesystem the store is built on.
pub trait FileSystem {
    /// Open file handle; dropping it closes the file.
    type File: Read + Write;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<Self::File>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Rename `from` to `to`. Whether an existing `to` is replaced depends on
    /// the filesystem.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Flush an open file to persistent media.
    fn sync(&self, file: &mut Self::File) -> io::Result<()>;

    /// Persist directory metadata after a rename or delete of `path`.
    fn sync_dir(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool;
}

/// Host filesystem rooted at a directory.
///
/// Store paths are interpreted relative to the root, so `/data.db` maps to
/// `<root>/data.db` the same way it would on a mounted flash partition.
#[derive(Debug, Clone)]
pub struct StdFileSystem {
    root: PathBuf,
}

impl StdFileSystem {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a store path. `..` never climbs above the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let mut host = self.root.clone();
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    host.push(part);
                    depth += 1;
                }
                Component::ParentDir if depth > 0 => {
                    host.pop();
                    depth -= 1;
                }
                Component::ParentDir => {}
                Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            }
        }
        host
    }
}

impl FileSystem for StdFileSystem {
    type File = File;

    fn open(&self, path: &Path, mode: OpenMode) -> io::Result<File> {
        let host = self.resolve(path);
        match mode {
            OpenMode::Append => OpenOptions::new().create(true).append(true).open(host),
            OpenMode::Read => File::open(host),
            OpenMode::WriteTruncate => OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(host),
        }
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(self.resolve(path))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(self.resolve(from), self.resolve(to))
    }

    fn sync(&self, file: &mut File) -> io::Result<()> {
        durable_sync(file)
    }

    fn sync_dir(&self, path: &Path) -> io::Result<()> {
        sync_parent_dir(&self.resolve(path))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_strips_root() {
        let fs = StdFileSystem::new("/mnt/flash");
        assert_eq!(fs.resolve(Path::new("/data.db")), PathBuf::from("/mnt/flash/data.db"));
        assert_eq!(fs.resolve(Path::new("cfg/wifi.db")), PathBuf::from("/mnt/flash/cfg/wifi.db"));
    }

    #[test]
    fn test_resolve_stays_under_root() {
        let fs = StdFileSystem::new("/mnt/flash");
        assert_eq!(fs.resolve(Path::new("/../x.db")), PathBuf::from("/mnt/flash/x.db"));
        assert_eq!(fs.resolve(Path::new("/../../etc/passwd")), PathBuf::from("/mnt/flash/etc/passwd"));
        assert_eq!(fs.resolve(Path::new("/cfg/../data.db")), PathBuf::from("/mnt/flash/data.db"));
        assert_eq!(fs.resolve(Path::new("/cfg/../../data.db")), PathBuf::from("/mnt/flash/data.db"));
    }

    #[test]
    fn test_append_then_read() {
        let tmp = TempDir::new().unwrap();
        let fs = StdFileSystem::new(tmp.path());
        let path = Path::new("/data.db");

        fs.open(path, OpenMode::Append).unwrap().write_all(b"abc").unwrap();
        fs.open(path, OpenMode::Append).unwrap().write_all(b"def").unwrap();

        let mut out = Vec::new();
        fs.open(path, OpenMode::Read).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn test_truncate_rename_remove() {
        let tmp = TempDir::new().unwrap();
        let fs = StdFileSystem::new(tmp.path());
        let a = Path::new("/a.db");
        let b = Path::new("/b.db");

        fs.open(a, OpenMode::Append).unwrap().write_all(b"old contents").unwrap();
        fs.open(a, OpenMode::WriteTruncate).unwrap().write_all(b"new").unwrap();
        fs.rename(a, b).unwrap();
        assert!(!fs.exists(a));
        assert_eq!(std::fs::read(tmp.path().join("b.db")).unwrap(), b"new");

        fs.remove(b).unwrap();
        assert!(!fs.exists(b));
        assert_eq!(fs.remove(b).unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let fs = StdFileSystem::new(tmp.path());
        let err = fs.open(Path::new("/missing.db"), OpenMode::Read).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_sync_open_file() {
        let tmp = TempDir::new().unwrap();
        let fs = StdFileSystem::new(tmp.path());
        let mut file = fs.open(Path::new("/data.db"), OpenMode::Append).unwrap();
        file.write_all(b"x").unwrap();
        fs.sync(&mut file).unwrap();
        fs.sync_dir(Path::new("/data.db")).unwrap();
    }
}
