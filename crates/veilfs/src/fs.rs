//! The encrypted filesystem orchestrator.
//!
//! `EncryptedFs` composes two injected store collaborators:
//!
//! ```text
//! caller ──▶ EncryptedFs ──▶ plaintext-view store   (block-aligned mirror,
//!                 │                                  source of truth for stat)
//!                 └────────▶ ciphertext-backing store ([iv][ciphertext] chunks
//!                                                      + trailing metadata chunk)
//! ```
//!
//! It never touches physical storage directly. Reads and writes translate
//! plaintext positions into chunk ranges; partial edge blocks are merged by
//! reading, decrypting, and splicing the existing block (the overlay), so
//! bytes outside the written range survive untouched.
//!
//! All primary operations are synchronous and unlocked per handle; callers
//! must serialize concurrent access to a single descriptor because the
//! overlay is a read-modify-write sequence. See [`crate::aio`] for the
//! async wrapper.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use tracing::{debug, warn};
use veilfs_core::{
    DirEntry, EfsOptions, FileStat, FsError, FsResult, OpenFlags, StoreFd, StoreSide,
};
use veilfs_crypto::{CipherPool, Cryptor, IV_SIZE};
use veilfs_store::Store;

use crate::handle::FileHandle;
use crate::layout::BlockLayout;
use crate::metadata::FileMetadata;

/// Domain salt for the PBKDF2 derivation. Fixed so the same key material
/// reopens files across instances.
const KDF_SALT: &[u8] = b"veilfs/kdf/v1";

fn plain_err(source: io::Error) -> FsError {
    FsError::store(StoreSide::Plain, source)
}

fn cipher_err(source: io::Error) -> FsError {
    FsError::store(StoreSide::Cipher, source)
}

pub struct EncryptedFs {
    cryptor: Cryptor,
    pool: Option<CipherPool>,
    plain: Arc<dyn Store>,
    cipher: Arc<dyn Store>,
    layout: BlockLayout,
    umask: u32,
    /// Open handles, keyed by the plaintext-view store's native descriptor
    /// (the value returned to callers).
    handles: Mutex<HashMap<StoreFd, FileHandle>>,
    /// Per-open metadata cache, registered and removed together with the
    /// handle entry.
    metadata: Mutex<HashMap<StoreFd, FileMetadata>>,
}

impl EncryptedFs {
    /// Build the layer over two injected stores.
    ///
    /// The working key is derived from `key_material` through PBKDF2
    /// unconditionally, even when the material is already a derived key.
    pub fn new(
        key_material: &[u8],
        plain: Arc<dyn Store>,
        cipher: Arc<dyn Store>,
        options: EfsOptions,
    ) -> FsResult<Self> {
        if options.block_size == 0 {
            return Err(FsError::InvalidArgument("block_size must be nonzero".into()));
        }
        if options.iv_size != IV_SIZE {
            return Err(FsError::InvalidArgument(format!(
                "iv_size must be {IV_SIZE} for AES-256-CTR, got {}",
                options.iv_size
            )));
        }
        let cryptor = Cryptor::new(key_material, KDF_SALT)
            .map_err(|e| FsError::InvalidArgument(e.to_string()))?;
        let pool = options
            .workers
            .map(CipherPool::new)
            .transpose()
            .map_err(|e| FsError::InvalidArgument(e.to_string()))?;
        Ok(Self {
            cryptor,
            pool,
            plain,
            cipher,
            layout: BlockLayout::new(options.block_size, options.iv_size),
            umask: options.umask,
            handles: Mutex::new(HashMap::new()),
            metadata: Mutex::new(HashMap::new()),
        })
    }

    pub fn block_size(&self) -> usize {
        self.layout.block_size()
    }

    pub fn chunk_size(&self) -> usize {
        self.layout.chunk_size()
    }

    // ── Handle table access ───────────────────────────────────────────────

    fn handles_lock(&self) -> MutexGuard<'_, HashMap<StoreFd, FileHandle>> {
        match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn metadata_lock(&self) -> MutexGuard<'_, HashMap<StoreFd, FileMetadata>> {
        match self.metadata.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn handle(&self, fd: StoreFd) -> FsResult<FileHandle> {
        self.handles_lock()
            .get(&fd)
            .copied()
            .ok_or_else(|| FsError::not_found(format!("file descriptor {fd}")))
    }

    fn meta(&self, fd: StoreFd) -> FsResult<FileMetadata> {
        self.metadata_lock()
            .get(&fd)
            .cloned()
            .ok_or_else(|| FsError::not_found(format!("metadata for descriptor {fd}")))
    }

    /// Logical plaintext length of an open file.
    pub fn size(&self, fd: StoreFd) -> FsResult<u64> {
        Ok(self.meta(fd)?.size)
    }

    // ── Open / close ──────────────────────────────────────────────────────

    /// Open a matching path in both stores and register the paired handle.
    ///
    /// A fresh (or truncated) file gets a zero-size metadata record persisted
    /// immediately as its trailing chunk; an existing file has its trailing
    /// chunk decrypted, parsed, and validated against the instance key. Any
    /// failure aborts before the handle is registered.
    pub fn open(&self, path: impl AsRef<Path>, flags: OpenFlags, mode: u32) -> FsResult<StoreFd> {
        let path = path.as_ref();
        let mode = mode & !self.umask;

        if flags.create() {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    let dir_mode = 0o777 & !self.umask;
                    self.plain.mkdir_all(parent, dir_mode).map_err(plain_err)?;
                    self.cipher.mkdir_all(parent, dir_mode).map_err(cipher_err)?;
                }
            }
        }

        let upper = self.plain.open(path, flags, mode).map_err(plain_err)?;
        let lower = match self.cipher.open(path, flags, mode) {
            Ok(fd) => fd,
            Err(e) => {
                let _ = self.plain.close(upper);
                return Err(cipher_err(e));
            }
        };

        let meta = match self.load_or_init_metadata(lower, flags) {
            Ok(meta) => meta,
            Err(e) => {
                let _ = self.plain.close(upper);
                let _ = self.cipher.close(lower);
                return Err(e);
            }
        };

        self.handles_lock()
            .insert(upper, FileHandle::new(lower, upper, flags));
        self.metadata_lock().insert(upper, meta);
        debug!(path = %path.display(), fd = upper, "open");
        Ok(upper)
    }

    fn load_or_init_metadata(&self, lower: StoreFd, flags: OpenFlags) -> FsResult<FileMetadata> {
        let cipher_len = self.cipher.len(lower).map_err(cipher_err)?;
        if cipher_len == 0 {
            // Fresh or just-truncated file. Read-only opens of an empty file
            // keep the record in memory only.
            let meta = FileMetadata::fresh(self.cryptor.key_hash());
            if flags.is_writable() {
                self.persist_metadata(lower, &meta, 0)?;
            }
            return Ok(meta);
        }

        let chunk_size = self.layout.chunk_size();
        let chunks = cipher_len / chunk_size as u64;
        if chunks == 0 {
            return Err(FsError::corruption("ciphertext file shorter than one chunk"));
        }
        let offset = self.layout.chunk_offset(chunks - 1);
        let mut chunk = vec![0u8; chunk_size];
        let got = self
            .cipher
            .read_at(lower, &mut chunk, offset)
            .map_err(cipher_err)?;
        if got != chunk_size {
            return Err(FsError::corruption("trailing metadata chunk truncated"));
        }
        let meta = FileMetadata::unseal(&chunk, &self.cryptor, &self.layout)?;
        if meta.key_hash != self.cryptor.key_hash() {
            return Err(FsError::corruption(
                "metadata key fingerprint does not match the instance key",
            ));
        }
        Ok(meta)
    }

    fn persist_metadata(&self, lower: StoreFd, meta: &FileMetadata, offset: u64) -> FsResult<()> {
        let chunk = meta.seal(&self.cryptor, &self.layout)?;
        self.cipher
            .write_at(lower, &chunk, offset)
            .map_err(cipher_err)?;
        Ok(())
    }

    /// Close both inner descriptors and drop the handle and metadata entries.
    pub fn close(&self, fd: StoreFd) -> FsResult<()> {
        let handle = self
            .handles_lock()
            .remove(&fd)
            .ok_or_else(|| FsError::not_found(format!("file descriptor {fd}")))?;
        self.metadata_lock().remove(&fd);
        self.plain.close(handle.upper()).map_err(plain_err)?;
        self.cipher.close(handle.lower()).map_err(cipher_err)?;
        debug!(fd, "close");
        Ok(())
    }

    // ── Read path ─────────────────────────────────────────────────────────

    /// Read into `buf` starting at plaintext `position`.
    ///
    /// The requested length is clamped so `position + length` never exceeds
    /// the logical file size; the clamped length is returned. There is no
    /// distinct end-of-file signal.
    pub fn read(&self, fd: StoreFd, buf: &mut [u8], position: u64) -> FsResult<usize> {
        self.read_impl(fd, buf, position, false)
    }

    pub(crate) fn read_impl(
        &self,
        fd: StoreFd,
        buf: &mut [u8],
        position: u64,
        offload: bool,
    ) -> FsResult<usize> {
        let handle = self.handle(fd)?;
        if !handle.flags().is_readable() {
            return Err(FsError::InvalidArgument(format!(
                "descriptor {fd} is not open for reading"
            )));
        }
        let meta = self.meta(fd)?;
        let len = (buf.len() as u64).min(meta.size.saturating_sub(position)) as usize;
        if len == 0 {
            return Ok(0);
        }

        let start = self.layout.block_number(position);
        let n = self.layout.blocks_needed(len, position);
        let plaintext = self.read_blocks(handle.lower(), start, n, offload)?;
        let boundary = self.layout.boundary(position);
        buf[..len].copy_from_slice(&plaintext[boundary..boundary + len]);
        Ok(len)
    }

    /// Read and decrypt `n` contiguous chunks starting at chunk `start`,
    /// returning the concatenated plaintext blocks.
    fn read_blocks(&self, lower: StoreFd, start: u64, n: u64, offload: bool) -> FsResult<Vec<u8>> {
        let chunk_size = self.layout.chunk_size();
        let iv_size = self.layout.iv_size();
        let mut raw = vec![0u8; n as usize * chunk_size];
        // A short read leaves the tail zeroed; the size clamp already
        // excludes any bytes such chunks would back.
        self.cipher
            .read_at(lower, &mut raw, self.layout.chunk_offset(start))
            .map_err(cipher_err)?;

        let mut batch: Vec<(&[u8], [u8; IV_SIZE])> = Vec::with_capacity(n as usize);
        for chunk in raw.chunks_exact(chunk_size) {
            let iv: [u8; IV_SIZE] = chunk[..iv_size]
                .try_into()
                .map_err(|_| FsError::corruption("chunk IV truncated"))?;
            batch.push((&chunk[iv_size..], iv));
        }
        let blocks: Vec<Vec<u8>> = match (&self.pool, offload) {
            (Some(pool), true) => pool.decrypt_blocks(&self.cryptor, &batch),
            _ => batch
                .iter()
                .map(|(ciphertext, iv)| self.cryptor.decrypt_block(ciphertext, iv))
                .collect(),
        };
        Ok(blocks.concat())
    }

    // ── Write path ────────────────────────────────────────────────────────

    /// Write `data` at plaintext `position`. Returns `data.len()`.
    ///
    /// Partial edge blocks are merged by overlay: the existing block is read
    /// and decrypted, the new bytes are spliced in, and the rest of the
    /// block is preserved. Every touched block is re-encrypted under a fresh
    /// random IV. A size-increasing write relocates the trailing metadata
    /// chunk to the new end of the ciphertext file.
    pub fn write(&self, fd: StoreFd, data: &[u8], position: u64) -> FsResult<usize> {
        self.write_impl(fd, data, position, false)
    }

    pub(crate) fn write_impl(
        &self,
        fd: StoreFd,
        data: &[u8],
        position: u64,
        offload: bool,
    ) -> FsResult<usize> {
        let handle = self.handle(fd)?;
        if !handle.flags().is_writable() {
            return Err(FsError::InvalidArgument(format!(
                "descriptor {fd} is not open for writing"
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }
        let meta = self.meta(fd)?;

        let bs = self.layout.block_size();
        let boundary = self.layout.boundary(position);
        let start = self.layout.block_number(position);
        let n = self.layout.blocks_needed(data.len(), position) as usize;

        // Assemble the full plaintext span, overlaying the partial edge
        // blocks so untouched bytes survive.
        let mut plain = vec![0u8; n * bs];
        let first = self.read_existing_block(handle.lower(), start, &meta)?;
        plain[..bs].copy_from_slice(&first);
        let head = data.len().min(bs - boundary);
        plain[boundary..boundary + head].copy_from_slice(&data[..head]);

        if n >= 2 {
            let last = self.read_existing_block(handle.lower(), start + n as u64 - 1, &meta)?;
            let last_slot = (n - 1) * bs;
            plain[last_slot..].copy_from_slice(&last);
            let tail = boundary + data.len() - (n - 1) * bs;
            plain[last_slot..last_slot + tail].copy_from_slice(&data[data.len() - tail..]);
            if n >= 3 {
                // Interior blocks are fully overwritten; no overlay needed.
                plain[bs..last_slot].copy_from_slice(&data[head..head + (n - 2) * bs]);
            }
        }

        // Mirror the block-aligned plaintext into the plaintext-view store.
        self.plain
            .write_at(handle.upper(), &plain, self.layout.block_offset(start))
            .map_err(plain_err)?;

        // One fresh IV per block, then a single chunk-aligned write.
        let chunks = self.encrypt_blocks(&plain, offload);
        self.cipher
            .write_at(handle.lower(), &chunks, self.layout.chunk_offset(start))
            .map_err(cipher_err)?;

        let end = position + data.len() as u64;
        if end > meta.size {
            let grown = FileMetadata {
                size: end,
                key_hash: meta.key_hash,
            };
            let offset = self.layout.chunk_offset(self.layout.data_chunks(end));
            self.persist_metadata(handle.lower(), &grown, offset)?;
            self.metadata_lock().insert(fd, grown);
        }
        debug!(fd, position, len = data.len(), blocks = n, "write");
        Ok(data.len())
    }

    /// Encrypt block-aligned plaintext into a contiguous run of chunks.
    fn encrypt_blocks(&self, plain: &[u8], offload: bool) -> Vec<u8> {
        let bs = self.layout.block_size();
        let ivs: Vec<[u8; IV_SIZE]> = plain
            .chunks_exact(bs)
            .map(|_| self.cryptor.random_iv())
            .collect();
        let batch: Vec<(&[u8], [u8; IV_SIZE])> = plain
            .chunks_exact(bs)
            .zip(ivs.iter())
            .map(|(block, iv)| (block, *iv))
            .collect();
        let encrypted: Vec<Vec<u8>> = match (&self.pool, offload) {
            (Some(pool), true) => pool.encrypt_blocks(&self.cryptor, &batch),
            _ => batch
                .iter()
                .map(|(block, iv)| self.cryptor.encrypt_block(block, iv))
                .collect(),
        };

        let mut out = Vec::with_capacity(ivs.len() * self.layout.chunk_size());
        for (iv, ciphertext) in ivs.iter().zip(encrypted) {
            out.extend_from_slice(iv);
            out.extend_from_slice(&ciphertext);
        }
        out
    }

    /// Decrypted contents of block `n`, or a zero block when `n` lies past
    /// the data region (where only the metadata chunk, or nothing, exists).
    fn read_existing_block(
        &self,
        lower: StoreFd,
        n: u64,
        meta: &FileMetadata,
    ) -> FsResult<Vec<u8>> {
        let bs = self.layout.block_size();
        if n >= self.layout.data_chunks(meta.size) {
            return Ok(vec![0u8; bs]);
        }
        let chunk_size = self.layout.chunk_size();
        let mut chunk = vec![0u8; chunk_size];
        let got = self
            .cipher
            .read_at(lower, &mut chunk, self.layout.chunk_offset(n))
            .map_err(cipher_err)?;
        if got != chunk_size {
            return Err(FsError::corruption(format!("data chunk {n} truncated")));
        }
        let iv: [u8; IV_SIZE] = chunk[..self.layout.iv_size()]
            .try_into()
            .map_err(|_| FsError::corruption("chunk IV truncated"))?;
        Ok(self.cryptor.decrypt_block(&chunk[self.layout.iv_size()..], &iv))
    }

    // ── Whole-file convenience ────────────────────────────────────────────

    pub fn read_file(&self, path: impl AsRef<Path>) -> FsResult<Vec<u8>> {
        self.read_file_impl(path, false)
    }

    pub(crate) fn read_file_impl(
        &self,
        path: impl AsRef<Path>,
        offload: bool,
    ) -> FsResult<Vec<u8>> {
        let fd = self.open(path, OpenFlags::read(), 0)?;
        let result = (|| {
            let size = self.size(fd)?;
            let mut buf = vec![0u8; size as usize];
            let n = self.read_impl(fd, &mut buf, 0, offload)?;
            buf.truncate(n);
            Ok(buf)
        })();
        let closed = self.close(fd);
        let buf = result?;
        closed?;
        Ok(buf)
    }

    pub fn write_file(&self, path: impl AsRef<Path>, data: &[u8]) -> FsResult<()> {
        self.write_file_impl(path, data, false)
    }

    pub(crate) fn write_file_impl(
        &self,
        path: impl AsRef<Path>,
        data: &[u8],
        offload: bool,
    ) -> FsResult<()> {
        let fd = self.open(path, OpenFlags::write_create(), 0o666)?;
        let result = self.write_impl(fd, data, 0, offload).map(|_| ());
        let closed = self.close(fd);
        result?;
        closed
    }

    // ── Directory / attribute fan-out ─────────────────────────────────────

    /// Apply one mirrored operation to both stores, plaintext-view first.
    /// There is no rollback: a second-store failure leaves the stores
    /// inconsistent and surfaces the error as-is.
    fn fan_out<F>(&self, op: &'static str, f: F) -> FsResult<()>
    where
        F: Fn(&dyn Store) -> io::Result<()>,
    {
        f(self.plain.as_ref()).map_err(plain_err)?;
        f(self.cipher.as_ref()).map_err(|e| {
            warn!(
                op,
                "ciphertext-backing store failed after plaintext-view store succeeded; \
                 stores are now inconsistent"
            );
            cipher_err(e)
        })
    }

    pub fn mkdir(&self, path: impl AsRef<Path>, mode: u32) -> FsResult<()> {
        let path = path.as_ref();
        let mode = mode & !self.umask;
        self.fan_out("mkdir", |store| store.mkdir(path, mode))
    }

    pub fn mkdir_all(&self, path: impl AsRef<Path>, mode: u32) -> FsResult<()> {
        let path = path.as_ref();
        let mode = mode & !self.umask;
        self.fan_out("mkdir_all", |store| store.mkdir_all(path, mode))
    }

    pub fn rmdir(&self, path: impl AsRef<Path>) -> FsResult<()> {
        let path = path.as_ref();
        self.fan_out("rmdir", |store| store.rmdir(path))
    }

    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> FsResult<()> {
        let (from, to) = (from.as_ref(), to.as_ref());
        self.fan_out("rename", |store| store.rename(from, to))
    }

    pub fn symlink(&self, target: impl AsRef<Path>, link: impl AsRef<Path>) -> FsResult<()> {
        let (target, link) = (target.as_ref(), link.as_ref());
        self.fan_out("symlink", |store| store.symlink(target, link))
    }

    pub fn link(&self, existing: impl AsRef<Path>, new: impl AsRef<Path>) -> FsResult<()> {
        let (existing, new) = (existing.as_ref(), new.as_ref());
        self.fan_out("link", |store| store.link(existing, new))
    }

    pub fn chmod(&self, path: impl AsRef<Path>, mode: u32) -> FsResult<()> {
        let path = path.as_ref();
        self.fan_out("chmod", |store| store.chmod(path, mode))
    }

    pub fn chown(&self, path: impl AsRef<Path>, uid: u32, gid: u32) -> FsResult<()> {
        let path = path.as_ref();
        self.fan_out("chown", |store| store.chown(path, uid, gid))
    }

    pub fn utimes(
        &self,
        path: impl AsRef<Path>,
        atime: SystemTime,
        mtime: SystemTime,
    ) -> FsResult<()> {
        let path = path.as_ref();
        self.fan_out("utimes", |store| store.utimes(path, atime, mtime))
    }

    /// Create a uniquely named directory in both stores and return its path.
    /// The plaintext-view store picks the name; the ciphertext store mirrors
    /// it.
    pub fn mkdtemp(&self, prefix: impl AsRef<Path>) -> FsResult<PathBuf> {
        let dir = self.plain.mkdtemp(prefix.as_ref()).map_err(plain_err)?;
        self.cipher.mkdir(&dir, 0o700).map_err(|e| {
            warn!(
                op = "mkdtemp",
                "ciphertext-backing store failed after plaintext-view store succeeded; \
                 stores are now inconsistent"
            );
            cipher_err(e)
        })?;
        Ok(dir)
    }

    // The plaintext-view store is the source of truth for attribute queries.

    pub fn stat(&self, path: impl AsRef<Path>) -> FsResult<FileStat> {
        self.plain.stat(path.as_ref()).map_err(plain_err)
    }

    pub fn fstat(&self, fd: StoreFd) -> FsResult<FileStat> {
        let handle = self.handle(fd)?;
        self.plain.fstat(handle.upper()).map_err(plain_err)
    }

    pub fn readdir(&self, path: impl AsRef<Path>) -> FsResult<Vec<DirEntry>> {
        self.plain.readdir(path.as_ref()).map_err(plain_err)
    }

    pub fn exists(&self, path: impl AsRef<Path>) -> FsResult<bool> {
        self.plain.exists(path.as_ref()).map_err(plain_err)
    }

    pub fn realpath(&self, path: impl AsRef<Path>) -> FsResult<PathBuf> {
        self.plain.realpath(path.as_ref()).map_err(plain_err)
    }
}
