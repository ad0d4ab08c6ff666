//! On-disk store backend rooted at a directory.
//!
//! Virtual absolute paths (`/dir/file`) map to entries under the root
//! directory. Positioned I/O goes through `FileExt`, so no per-descriptor
//! cursor state exists; descriptors are issued from a monotonic counter and
//! map to open `File` objects.

use std::collections::HashMap;
use std::fs::{self, File, FileTimes, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use veilfs_core::{DirEntry, FileKind, FileStat, OpenFlags, StoreFd};

use crate::{temp_suffix, Store};

pub struct DiskStore {
    root: PathBuf,
    fds: Mutex<HashMap<StoreFd, File>>,
    next_fd: AtomicU64,
}

impl DiskStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "disk store opened");
        Ok(Self {
            root,
            fds: Mutex::new(HashMap::new()),
            next_fd: AtomicU64::new(1),
        })
    }

    /// Map a virtual absolute path to its on-disk location.
    fn real(&self, path: &Path) -> PathBuf {
        let rel: PathBuf = path
            .components()
            .filter_map(|c| match c {
                std::path::Component::Normal(name) => Some(name),
                _ => None,
            })
            .collect();
        self.root.join(rel)
    }

    /// Map an on-disk location back to its virtual path, if under the root.
    fn virtualize(&self, real: &Path) -> PathBuf {
        match real.strip_prefix(&self.root) {
            Ok(rel) => Path::new("/").join(rel),
            Err(_) => real.to_path_buf(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<StoreFd, File>> {
        match self.fds.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_file<T>(&self, fd: StoreFd, f: impl FnOnce(&File) -> io::Result<T>) -> io::Result<T> {
        let fds = self.lock();
        let file = fds.get(&fd).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("bad file descriptor {fd}"))
        })?;
        f(file)
    }
}

fn unix_time(secs: i64, nanos: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

fn stat_from(meta: &fs::Metadata) -> FileStat {
    let kind = if meta.file_type().is_dir() {
        FileKind::Dir
    } else if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else {
        FileKind::File
    };
    FileStat {
        size: meta.len(),
        kind,
        mode: meta.mode(),
        uid: meta.uid(),
        gid: meta.gid(),
        nlink: meta.nlink() as u32,
        atime: unix_time(meta.atime(), meta.atime_nsec()),
        mtime: unix_time(meta.mtime(), meta.mtime_nsec()),
        ctime: unix_time(meta.ctime(), meta.ctime_nsec()),
    }
}

impl Store for DiskStore {
    fn open(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<StoreFd> {
        let real = self.real(path);
        let mut options = OpenOptions::new();
        // Write descriptors also get read access: the layer above performs
        // read-modify-write merges through the same descriptor.
        options
            .read(flags.is_readable() || flags.is_writable())
            .write(flags.is_writable())
            .truncate(flags.truncate() && flags.is_writable());
        if flags.create() && flags.excl() {
            options.create_new(true);
        } else if flags.create() {
            options.create(true);
        }
        let file = options.open(&real)?;
        if flags.create() {
            // Honor the caller's mode on creation; ignore failure on
            // pre-existing files opened without ownership.
            let _ = file.set_permissions(Permissions::from_mode(mode & 0o7777));
        }
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(fd, file);
        Ok(fd)
    }

    fn close(&self, fd: StoreFd) -> io::Result<()> {
        self.lock().remove(&fd).map(|_| ()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("bad file descriptor {fd}"))
        })
    }

    fn read_at(&self, fd: StoreFd, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.with_file(fd, |file| {
            let mut total = 0;
            while total < buf.len() {
                match file.read_at(&mut buf[total..], offset + total as u64) {
                    Ok(0) => break,
                    Ok(n) => total += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(total)
        })
    }

    fn write_at(&self, fd: StoreFd, data: &[u8], offset: u64) -> io::Result<usize> {
        self.with_file(fd, |file| {
            file.write_all_at(data, offset)?;
            Ok(data.len())
        })
    }

    fn len(&self, fd: StoreFd) -> io::Result<u64> {
        self.with_file(fd, |file| Ok(file.metadata()?.len()))
    }

    fn stat(&self, path: &Path) -> io::Result<FileStat> {
        Ok(stat_from(&fs::metadata(self.real(path))?))
    }

    fn fstat(&self, fd: StoreFd) -> io::Result<FileStat> {
        self.with_file(fd, |file| Ok(stat_from(&file.metadata()?)))
    }

    fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        let real = self.real(path);
        fs::create_dir(&real)?;
        fs::set_permissions(&real, Permissions::from_mode(mode & 0o7777))
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let real = self.real(path);
        fs::create_dir_all(&real)?;
        fs::set_permissions(&real, Permissions::from_mode(mode & 0o7777))
    }

    fn rmdir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(self.real(path))
    }

    fn readdir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.real(path))? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let kind = if file_type.is_dir() {
                FileKind::Dir
            } else if file_type.is_symlink() {
                FileKind::Symlink
            } else {
                FileKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(self.real(from), self.real(to))
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        // Targets are stored verbatim; only the link location is rooted.
        std::os::unix::fs::symlink(target, self.real(link))
    }

    fn link(&self, existing: &Path, new: &Path) -> io::Result<()> {
        fs::hard_link(self.real(existing), self.real(new))
    }

    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(self.real(path), Permissions::from_mode(mode & 0o7777))
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> io::Result<()> {
        std::os::unix::fs::chown(self.real(path), Some(uid), Some(gid))
    }

    fn utimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> io::Result<()> {
        let file = File::open(self.real(path))?;
        file.set_times(FileTimes::new().set_accessed(atime).set_modified(mtime))
    }

    fn mkdtemp(&self, prefix: &Path) -> io::Result<PathBuf> {
        let base = prefix.to_string_lossy().into_owned();
        for _ in 0..32 {
            let candidate = PathBuf::from(format!("{base}{}", temp_suffix()));
            match fs::create_dir(self.real(&candidate)) {
                Ok(()) => {
                    fs::set_permissions(self.real(&candidate), Permissions::from_mode(0o700))?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "mkdtemp: exhausted candidate names",
        ))
    }

    fn exists(&self, path: &Path) -> io::Result<bool> {
        Ok(self.real(path).exists())
    }

    fn realpath(&self, path: &Path) -> io::Result<PathBuf> {
        let resolved = fs::canonicalize(self.real(path))?;
        Ok(self.virtualize(&resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veilfs_core::flags::{O_CREAT, O_RDONLY, O_WRONLY};

    fn store() -> (tempfile::TempDir, DiskStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path().join("store")).unwrap();
        (dir, store)
    }

    #[test]
    fn write_read_roundtrip() {
        let (_dir, store) = store();
        let fd = store
            .open(Path::new("/f"), OpenFlags::new(O_WRONLY | O_CREAT), 0o644)
            .unwrap();
        store.write_at(fd, b"on disk", 0).unwrap();
        store.close(fd).unwrap();

        let fd = store.open(Path::new("/f"), OpenFlags::new(O_RDONLY), 0).unwrap();
        let mut buf = [0u8; 16];
        let n = store.read_at(fd, &mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"on disk");
        store.close(fd).unwrap();
    }

    #[test]
    fn sparse_write_reads_zeros() {
        let (_dir, store) = store();
        let fd = store
            .open(Path::new("/sparse"), OpenFlags::new(O_WRONLY | O_CREAT), 0o644)
            .unwrap();
        store.write_at(fd, b"z", 100).unwrap();
        assert_eq!(store.len(fd).unwrap(), 101);
        store.close(fd).unwrap();

        let fd = store.open(Path::new("/sparse"), OpenFlags::new(O_RDONLY), 0).unwrap();
        let mut buf = [0xAAu8; 101];
        store.read_at(fd, &mut buf, 0).unwrap();
        assert_eq!(&buf[..100], &[0u8; 100]);
        assert_eq!(buf[100], b'z');
    }

    #[test]
    fn virtual_paths_stay_under_root() {
        let (_dir, store) = store();
        store.mkdir_all(Path::new("/a/b"), 0o755).unwrap();
        assert!(store.exists(Path::new("/a/b")).unwrap());
        let stat = store.stat(Path::new("/a/b")).unwrap();
        assert!(stat.is_dir());
    }

    #[test]
    fn mkdtemp_unique() {
        let (_dir, store) = store();
        let a = store.mkdtemp(Path::new("/t-")).unwrap();
        let b = store.mkdtemp(Path::new("/t-")).unwrap();
        assert_ne!(a, b);
        assert!(store.stat(&a).unwrap().is_dir());
    }
}
