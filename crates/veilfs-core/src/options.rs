/// Default plaintext block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default per-chunk IV size in bytes.
pub const DEFAULT_IV_SIZE: usize = 16;

/// Default umask applied to modes passed to open/mkdir.
pub const DEFAULT_UMASK: u32 = 0o022;

/// Construction options for the encrypted filesystem layer.
#[derive(Debug, Clone)]
pub struct EfsOptions {
    /// Mask cleared from every mode passed to open/mkdir.
    pub umask: u32,
    /// Plaintext block size; one ciphertext chunk holds exactly one block.
    pub block_size: usize,
    /// IV bytes prepended to each ciphertext block to form a chunk.
    pub iv_size: usize,
    /// Worker threads for the async cipher offload (None = run inline).
    /// Parallelizes CPU-bound cipher work only, never filesystem I/O.
    pub workers: Option<usize>,
}

impl Default for EfsOptions {
    fn default() -> Self {
        Self {
            umask: DEFAULT_UMASK,
            block_size: DEFAULT_BLOCK_SIZE,
            iv_size: DEFAULT_IV_SIZE,
            workers: None,
        }
    }
}

impl EfsOptions {
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn umask(mut self, umask: u32) -> Self {
        self.umask = umask;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }
}
