use veilfs_core::{OpenFlags, StoreFd};

/// Immutable pairing of the two inner store descriptors with the open flags.
///
/// Both descriptors are opened together by `EncryptedFs::open` and closed
/// together by `EncryptedFs::close`; the handle itself has no behavior.
#[derive(Debug, Clone, Copy)]
pub struct FileHandle {
    lower: StoreFd,
    upper: StoreFd,
    flags: OpenFlags,
}

impl FileHandle {
    pub fn new(lower: StoreFd, upper: StoreFd, flags: OpenFlags) -> Self {
        Self { lower, upper, flags }
    }

    /// Descriptor on the ciphertext-backing store.
    pub fn lower(&self) -> StoreFd {
        self.lower
    }

    /// Descriptor on the plaintext-view store.
    pub fn upper(&self) -> StoreFd {
        self.upper
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }
}
