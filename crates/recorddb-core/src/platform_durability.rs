//! Host durable-sync primitives backing `StdFileSystem::sync`.
//!
//! Flash targets get their durability from the filesystem driver; on a host
//! we map "sync" to the strongest flush each OS offers.

use std::fs::File;
use std::io;
use std::path::Path;

/// Push file contents to persistent media before returning.
///
/// - Linux: `fdatasync`, data without metadata
/// - macOS/iOS: `fcntl(F_FULLFSYNC)`, plain fsync stops at the drive cache there
/// - Windows: `FlushFileBuffers`
/// - Elsewhere: `File::sync_data`
pub fn durable_sync(file: &File) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd comes from a live File borrow, so it is open for the call.
        let rc = unsafe { libc::fdatasync(file.as_raw_fd()) };
        if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the fd comes from a live File borrow, so it is open for the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        if rc == 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    #[cfg(target_os = "windows")]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        // SAFETY: the handle comes from a live File borrow.
        let ok = unsafe { FlushFileBuffers(file.as_raw_handle() as *mut _) };
        if ok != 0 { Ok(()) } else { Err(io::Error::last_os_error()) }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
    {
        file.sync_data()
    }
}

/// Persist a rename or delete by syncing the containing directory.
///
/// Directories cannot be opened as files on Windows; there the rename is
/// already durable once `MoveFileEx` returns, so this is a no-op.
pub fn sync_parent_dir(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            let dir = File::open(parent)?;
            return durable_sync(&dir);
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
