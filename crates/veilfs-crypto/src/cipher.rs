//! Per-block AES-256-CTR encryption/decryption.
//!
//! Each block is encrypted under a fresh random 16-byte IV that the caller
//! persists alongside the ciphertext. CTR output is the same size as the
//! input, so chunk arithmetic never has to account for tag bytes.
//!
//! CTR provides no authentication; integrity checking is out of scope for
//! this layer.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::kdf::{derive_key, KdfParams, MasterKey};
use crate::{IV_SIZE, KEY_HASH_SIZE};

/// AES-256-CTR treating the whole 16-byte IV as the initial counter block.
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid KDF parameters: {0}")]
    InvalidParams(String),

    #[error("invalid IV length: expected {IV_SIZE} bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("failed to build cipher worker pool: {0}")]
    Pool(String),
}

/// Stateful symmetric cipher engine for the block layer.
///
/// Holds the derived working key; every encrypt/decrypt call builds a fresh
/// CTR instance for the supplied IV, so `Cryptor` is freely shared across
/// threads.
pub struct Cryptor {
    key: MasterKey,
}

impl Cryptor {
    /// Build a cryptor from raw key material.
    ///
    /// The working key is re-derived through PBKDF2 unconditionally, even
    /// when `material` is already a derived key.
    pub fn new(material: &[u8], salt: &[u8]) -> Result<Self, CryptoError> {
        let key = derive_key(material, salt, &KdfParams::default())?;
        Ok(Self { key })
    }

    /// Build a cryptor from key material with explicit KDF parameters.
    pub fn with_params(
        material: &[u8],
        salt: &[u8],
        params: &KdfParams,
    ) -> Result<Self, CryptoError> {
        let key = derive_key(material, salt, params)?;
        Ok(Self { key })
    }

    /// Encrypt one plaintext block under `iv`. Output length equals input
    /// length.
    pub fn encrypt_block(&self, plaintext: &[u8], iv: &[u8; IV_SIZE]) -> Vec<u8> {
        self.apply(plaintext, iv)
    }

    /// Decrypt one ciphertext block under the IV stored with it.
    pub fn decrypt_block(&self, ciphertext: &[u8], iv: &[u8; IV_SIZE]) -> Vec<u8> {
        // CTR decryption is the same keystream XOR as encryption.
        self.apply(ciphertext, iv)
    }

    /// Draw a fresh cryptographically random IV. Called before every block
    /// encryption; IVs are never reused.
    pub fn random_iv(&self) -> [u8; IV_SIZE] {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        iv
    }

    /// SHA-256 fingerprint of the working key, used for cross-open
    /// validation of the file metadata record.
    pub fn key_hash(&self) -> [u8; KEY_HASH_SIZE] {
        let digest = Sha256::digest(self.key.as_bytes());
        digest.into()
    }

    fn apply(&self, input: &[u8], iv: &[u8; IV_SIZE]) -> Vec<u8> {
        let mut cipher = Aes256Ctr::new(self.key.as_bytes().into(), iv.into());
        let mut output = input.to_vec();
        cipher.apply_keystream(&mut output);
        output
    }
}
