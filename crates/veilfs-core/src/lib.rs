//! veilfs-core: types shared by every veilfs crate
//!
//! Nothing in here does I/O or cryptography. This crate defines the error
//! taxonomy, the POSIX-style open/seek flag constants, the file attribute
//! types exchanged with store backends, and the construction options for the
//! encrypted filesystem layer.

pub mod error;
pub mod flags;
pub mod options;
pub mod types;

pub use error::{FsError, FsResult, StoreSide};
pub use flags::OpenFlags;
pub use options::EfsOptions;
pub use types::{DirEntry, FileKind, FileStat, StoreFd};
