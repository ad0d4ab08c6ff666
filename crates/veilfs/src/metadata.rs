//! The per-file metadata record.
//!
//! Every encrypted file carries one trailing chunk holding this record:
//! the logical plaintext length and a fingerprint of the key in effect when
//! the file was created, for cross-open validation.
//!
//! Sealed form: serde_json body behind a u32-LE length prefix, zero-padded
//! to exactly one block, then encrypted like any data block. Decoding is a
//! structured parse with a fixed schema; any mismatch is `Corruption`.

use serde::{Deserialize, Serialize};
use veilfs_core::{FsError, FsResult};
use veilfs_crypto::{Cryptor, IV_SIZE, KEY_HASH_SIZE};

use crate::layout::BlockLayout;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Logical plaintext length. Never decreases as a result of a write.
    pub size: u64,
    /// SHA-256 fingerprint of the working key that wrote this file.
    pub key_hash: [u8; KEY_HASH_SIZE],
}

impl FileMetadata {
    pub fn fresh(key_hash: [u8; KEY_HASH_SIZE]) -> Self {
        Self { size: 0, key_hash }
    }

    /// Serialize and pad to exactly one block.
    fn encode(&self, layout: &BlockLayout) -> FsResult<Vec<u8>> {
        let body = serde_json::to_vec(self)
            .map_err(|e| FsError::Corruption(format!("metadata encode: {e}")))?;
        if LEN_PREFIX + body.len() > layout.block_size() {
            return Err(FsError::InvalidArgument(format!(
                "metadata record ({} bytes) does not fit in one {}-byte block",
                LEN_PREFIX + body.len(),
                layout.block_size()
            )));
        }
        let mut block = vec![0u8; layout.block_size()];
        block[..LEN_PREFIX].copy_from_slice(&(body.len() as u32).to_le_bytes());
        block[LEN_PREFIX..LEN_PREFIX + body.len()].copy_from_slice(&body);
        Ok(block)
    }

    /// Structured decode of a padded metadata block.
    fn decode(block: &[u8], layout: &BlockLayout) -> FsResult<Self> {
        if block.len() != layout.block_size() {
            return Err(FsError::corruption(format!(
                "metadata block is {} bytes, expected {}",
                block.len(),
                layout.block_size()
            )));
        }
        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&block[..LEN_PREFIX]);
        let body_len = u32::from_le_bytes(len_bytes) as usize;
        if LEN_PREFIX + body_len > block.len() {
            return Err(FsError::corruption(format!(
                "metadata length prefix {body_len} exceeds block"
            )));
        }
        serde_json::from_slice(&block[LEN_PREFIX..LEN_PREFIX + body_len])
            .map_err(|e| FsError::Corruption(format!("metadata decode: {e}")))
    }

    /// Encrypt into one full chunk (`[iv][ciphertext]`) under a fresh IV.
    pub fn seal(&self, cryptor: &Cryptor, layout: &BlockLayout) -> FsResult<Vec<u8>> {
        let block = self.encode(layout)?;
        let iv = cryptor.random_iv();
        let ciphertext = cryptor.encrypt_block(&block, &iv);
        let mut chunk = Vec::with_capacity(layout.chunk_size());
        chunk.extend_from_slice(&iv);
        chunk.extend_from_slice(&ciphertext);
        Ok(chunk)
    }

    /// Decrypt and parse a trailing metadata chunk.
    pub fn unseal(chunk: &[u8], cryptor: &Cryptor, layout: &BlockLayout) -> FsResult<Self> {
        if chunk.len() != layout.chunk_size() {
            return Err(FsError::corruption(format!(
                "metadata chunk is {} bytes, expected {}",
                chunk.len(),
                layout.chunk_size()
            )));
        }
        let (iv_bytes, ciphertext) = chunk.split_at(layout.iv_size());
        let iv: [u8; IV_SIZE] = iv_bytes
            .try_into()
            .map_err(|_| FsError::corruption("metadata chunk IV truncated"))?;
        let block = cryptor.decrypt_block(ciphertext, &iv);
        Self::decode(&block, layout)
    }
}
