//! veilfs-crypto: all symmetric-key cryptography for the block layer
//!
//! Pipeline per block:
//! ```text
//! plaintext block ──AES-256-CTR(key, fresh random IV)──▶ [iv: 16][ciphertext: block]
//! ```
//!
//! The working key is always re-derived with PBKDF2-HMAC-SHA256 (10_000
//! iterations, 32-byte output) from whatever key material the caller
//! supplies, even when that material is itself a derived key.
//!
//! CTR keeps ciphertext the same length as plaintext, so a chunk is exactly
//! `iv_size + block_size` bytes with no authentication tag. This layer does
//! not provide tamper detection.

pub mod cipher;
pub mod kdf;
pub mod pool;

pub use cipher::{CryptoError, Cryptor};
pub use kdf::{derive_key, KdfParams, MasterKey};
pub use pool::CipherPool;

/// Size of the derived working key in bytes (256-bit).
pub const KEY_SIZE: usize = 32;

/// Size of a per-block IV in bytes (one AES counter block).
pub const IV_SIZE: usize = 16;

/// Size of a SHA-256 key fingerprint in bytes.
pub const KEY_HASH_SIZE: usize = 32;

/// Default PBKDF2 iteration count.
pub const PBKDF2_ITERATIONS: u32 = 10_000;
