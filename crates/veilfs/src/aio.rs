//! Tokio-backed asynchronous wrapper.
//!
//! Every method runs the same synchronous algorithm on the blocking thread
//! pool and resolves or errors exactly once. No additional concurrency
//! control is added: two overlapping writes to the same descriptor can race
//! the overlay's read-modify-write, exactly as with the sync API — callers
//! serialize per-descriptor access.
//!
//! When the filesystem was built with `EfsOptions::workers`, the async read
//! and write paths route per-block cipher work through the worker pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::task;
use veilfs_core::{DirEntry, FileStat, FsError, FsResult, OpenFlags, StoreFd};

use crate::fs::EncryptedFs;

#[derive(Clone)]
pub struct AsyncEncryptedFs {
    inner: Arc<EncryptedFs>,
}

impl AsyncEncryptedFs {
    pub fn new(inner: Arc<EncryptedFs>) -> Self {
        Self { inner }
    }

    /// The wrapped synchronous filesystem.
    pub fn inner(&self) -> &Arc<EncryptedFs> {
        &self.inner
    }

    async fn run<T, F>(&self, f: F) -> FsResult<T>
    where
        F: FnOnce(&EncryptedFs) -> FsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let fs = Arc::clone(&self.inner);
        match task::spawn_blocking(move || f(&fs)).await {
            Ok(result) => result,
            Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
            Err(join) => Err(FsError::InvalidArgument(format!(
                "blocking task cancelled: {join}"
            ))),
        }
    }

    pub async fn open(
        &self,
        path: impl Into<PathBuf>,
        flags: OpenFlags,
        mode: u32,
    ) -> FsResult<StoreFd> {
        let path = path.into();
        self.run(move |fs| fs.open(path, flags, mode)).await
    }

    pub async fn close(&self, fd: StoreFd) -> FsResult<()> {
        self.run(move |fs| fs.close(fd)).await
    }

    /// Read up to `len` bytes at `position`, clamped to the logical size.
    pub async fn read(&self, fd: StoreFd, len: usize, position: u64) -> FsResult<Vec<u8>> {
        self.run(move |fs| {
            let mut buf = vec![0u8; len];
            let n = fs.read_impl(fd, &mut buf, position, true)?;
            buf.truncate(n);
            Ok(buf)
        })
        .await
    }

    pub async fn write(&self, fd: StoreFd, data: Vec<u8>, position: u64) -> FsResult<usize> {
        self.run(move |fs| fs.write_impl(fd, &data, position, true))
            .await
    }

    pub async fn size(&self, fd: StoreFd) -> FsResult<u64> {
        self.run(move |fs| fs.size(fd)).await
    }

    pub async fn read_file(&self, path: impl Into<PathBuf>) -> FsResult<Vec<u8>> {
        let path = path.into();
        self.run(move |fs| fs.read_file_impl(path, true)).await
    }

    pub async fn write_file(&self, path: impl Into<PathBuf>, data: Vec<u8>) -> FsResult<()> {
        let path = path.into();
        self.run(move |fs| fs.write_file_impl(path, &data, true)).await
    }

    pub async fn mkdir(&self, path: impl Into<PathBuf>, mode: u32) -> FsResult<()> {
        let path = path.into();
        self.run(move |fs| fs.mkdir(path, mode)).await
    }

    pub async fn mkdir_all(&self, path: impl Into<PathBuf>, mode: u32) -> FsResult<()> {
        let path = path.into();
        self.run(move |fs| fs.mkdir_all(path, mode)).await
    }

    pub async fn rmdir(&self, path: impl Into<PathBuf>) -> FsResult<()> {
        let path = path.into();
        self.run(move |fs| fs.rmdir(path)).await
    }

    pub async fn rename(
        &self,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
    ) -> FsResult<()> {
        let (from, to) = (from.into(), to.into());
        self.run(move |fs| fs.rename(from, to)).await
    }

    pub async fn symlink(
        &self,
        target: impl Into<PathBuf>,
        link: impl Into<PathBuf>,
    ) -> FsResult<()> {
        let (target, link) = (target.into(), link.into());
        self.run(move |fs| fs.symlink(target, link)).await
    }

    pub async fn link(
        &self,
        existing: impl Into<PathBuf>,
        new: impl Into<PathBuf>,
    ) -> FsResult<()> {
        let (existing, new) = (existing.into(), new.into());
        self.run(move |fs| fs.link(existing, new)).await
    }

    pub async fn chmod(&self, path: impl Into<PathBuf>, mode: u32) -> FsResult<()> {
        let path = path.into();
        self.run(move |fs| fs.chmod(path, mode)).await
    }

    pub async fn chown(&self, path: impl Into<PathBuf>, uid: u32, gid: u32) -> FsResult<()> {
        let path = path.into();
        self.run(move |fs| fs.chown(path, uid, gid)).await
    }

    pub async fn utimes(
        &self,
        path: impl Into<PathBuf>,
        atime: SystemTime,
        mtime: SystemTime,
    ) -> FsResult<()> {
        let path = path.into();
        self.run(move |fs| fs.utimes(path, atime, mtime)).await
    }

    pub async fn mkdtemp(&self, prefix: impl Into<PathBuf>) -> FsResult<PathBuf> {
        let prefix = prefix.into();
        self.run(move |fs| fs.mkdtemp(prefix)).await
    }

    pub async fn stat(&self, path: impl Into<PathBuf>) -> FsResult<FileStat> {
        let path = path.into();
        self.run(move |fs| fs.stat(path)).await
    }

    pub async fn fstat(&self, fd: StoreFd) -> FsResult<FileStat> {
        self.run(move |fs| fs.fstat(fd)).await
    }

    pub async fn readdir(&self, path: impl Into<PathBuf>) -> FsResult<Vec<DirEntry>> {
        let path = path.into();
        self.run(move |fs| fs.readdir(path)).await
    }

    pub async fn exists(&self, path: impl Into<PathBuf>) -> FsResult<bool> {
        let path = path.into();
        self.run(move |fs| fs.exists(path)).await
    }

    pub async fn realpath(&self, path: impl Into<PathBuf>) -> FsResult<PathBuf> {
        let path = path.into();
        self.run(move |fs| fs.realpath(path)).await
    }
}
