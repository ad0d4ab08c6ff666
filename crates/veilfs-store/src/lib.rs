//! veilfs-store: the storage backend abstraction
//!
//! The encrypted filesystem layer never touches physical storage directly;
//! it composes two injected [`Store`] collaborators (a plaintext-view store
//! and a ciphertext-backing store) through this trait. Methods return
//! `io::Result` so backend errors propagate to the orchestrator unchanged.
//!
//! Two implementations ship with the workspace:
//! - [`MemStore`] — fully in-memory, used throughout the test suite
//! - [`DiskStore`] — std::fs-backed, rooted at a directory

pub mod disk;
pub mod mem;

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use veilfs_core::{DirEntry, FileStat, OpenFlags, StoreFd};

pub use disk::DiskStore;
pub use mem::MemStore;

/// A POSIX-like storage backend.
///
/// Paths are virtual absolute paths (`/dir/file`); each implementation maps
/// them to its own namespace. File descriptors are opaque and only valid on
/// the store that issued them.
pub trait Store: Send + Sync {
    fn open(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<StoreFd>;
    fn close(&self, fd: StoreFd) -> io::Result<()>;

    /// Read up to `buf.len()` bytes at `offset`. Returns the byte count;
    /// fewer than requested means end of file was reached.
    fn read_at(&self, fd: StoreFd, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write all of `data` at `offset`, zero-filling any gap past the
    /// current end of file. Returns `data.len()`.
    fn write_at(&self, fd: StoreFd, data: &[u8], offset: u64) -> io::Result<usize>;

    /// Current file size by descriptor.
    fn len(&self, fd: StoreFd) -> io::Result<u64>;

    fn stat(&self, path: &Path) -> io::Result<FileStat>;
    fn fstat(&self, fd: StoreFd) -> io::Result<FileStat>;

    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()>;
    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;
    fn rmdir(&self, path: &Path) -> io::Result<()>;
    fn readdir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;
    fn link(&self, existing: &Path, new: &Path) -> io::Result<()>;

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()>;
    fn utimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> io::Result<()>;

    /// Create a uniquely named directory from `prefix` (e.g. `/tmp/veil-`)
    /// and return its path.
    fn mkdtemp(&self, prefix: &Path) -> io::Result<PathBuf>;

    fn exists(&self, path: &Path) -> io::Result<bool>;
    fn realpath(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Random 6-character suffix for mkdtemp, shared by both backends.
pub(crate) fn temp_suffix() -> String {
    use rand::distributions::Alphanumeric;
    use rand::Rng;
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}
