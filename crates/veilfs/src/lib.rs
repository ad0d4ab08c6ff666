//! veilfs: transparent block-encrypting filesystem layer
//!
//! Callers perform ordinary file operations against a logical plaintext
//! file; the layer encrypts and decrypts fixed-size blocks and persists
//! them as independently-IV'd chunks in a backing store.
//!
//! ## On-disk layout (the only binary format this crate defines)
//!
//! ```text
//! ciphertext store, from offset 0:
//!   [iv: 16][ciphertext: 4096]  chunk 0  ← block 0
//!   [iv: 16][ciphertext: 4096]  chunk 1  ← block 1
//!   ...
//!   [iv: 16][ciphertext: 4096]  trailing chunk ← encrypted metadata record
//! ```
//!
//! The trailing metadata chunk (`{size, key_hash}`) relocates to the new
//! end of file on every size-increasing write.
//!
//! ## Stores
//!
//! The layer composes two injected [`Store`] collaborators: a
//! plaintext-view store (block-aligned mirror, source of truth for
//! stat/attribute queries) and a ciphertext-backing store (the chunk
//! format above). Directory and attribute operations fan out to both with
//! no transactional rollback.

pub mod aio;
pub mod fs;
pub mod handle;
pub mod layout;
pub mod metadata;
pub mod streams;

pub use aio::AsyncEncryptedFs;
pub use fs::EncryptedFs;
pub use handle::FileHandle;
pub use layout::BlockLayout;
pub use metadata::FileMetadata;
pub use streams::{FileReader, FileWriter};

pub use veilfs_core::flags;
pub use veilfs_core::{
    DirEntry, EfsOptions, FileKind, FileStat, FsError, FsResult, OpenFlags, StoreFd, StoreSide,
};
pub use veilfs_crypto::{CipherPool, Cryptor};
pub use veilfs_store::{DiskStore, MemStore, Store};
