//! Optional worker-thread offload for CPU-bound cipher calls.
//!
//! The pool parallelizes per-block encrypt/decrypt across a rayon thread
//! pool. It is used by the asynchronous filesystem API only and never
//! touches filesystem state, so enabling it is always safe. Disabled by
//! default.

use rayon::prelude::*;

use crate::cipher::{CryptoError, Cryptor};
use crate::IV_SIZE;

pub struct CipherPool {
    pool: rayon::ThreadPool,
}

impl CipherPool {
    /// Build a pool with `workers` threads (0 lets rayon pick the core count).
    pub fn new(workers: usize) -> Result<Self, CryptoError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("veilfs-cipher-{i}"))
            .build()
            .map_err(|e| CryptoError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Encrypt a batch of blocks, each under its own IV, in parallel.
    /// Results come back in input order.
    pub fn encrypt_blocks(
        &self,
        cryptor: &Cryptor,
        blocks: &[(&[u8], [u8; IV_SIZE])],
    ) -> Vec<Vec<u8>> {
        self.pool.install(|| {
            blocks
                .par_iter()
                .map(|(plaintext, iv)| cryptor.encrypt_block(plaintext, iv))
                .collect()
        })
    }

    /// Decrypt a batch of ciphertext blocks in parallel, in input order.
    pub fn decrypt_blocks(
        &self,
        cryptor: &Cryptor,
        blocks: &[(&[u8], [u8; IV_SIZE])],
    ) -> Vec<Vec<u8>> {
        self.pool.install(|| {
            blocks
                .par_iter()
                .map(|(ciphertext, iv)| cryptor.decrypt_block(ciphertext, iv))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KdfParams;

    fn test_cryptor() -> Cryptor {
        let params = KdfParams {
            iterations: 10,
            ..KdfParams::default()
        };
        Cryptor::with_params(b"pool test key", b"salt", &params).unwrap()
    }

    #[test]
    fn parallel_matches_serial() {
        let cryptor = test_cryptor();
        let pool = CipherPool::new(2).unwrap();

        let plain: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 512]).collect();
        let ivs: Vec<[u8; IV_SIZE]> = (0..8).map(|_| cryptor.random_iv()).collect();
        let batch: Vec<(&[u8], [u8; IV_SIZE])> = plain
            .iter()
            .zip(&ivs)
            .map(|(p, iv)| (p.as_slice(), *iv))
            .collect();

        let parallel = pool.encrypt_blocks(&cryptor, &batch);
        for (i, out) in parallel.iter().enumerate() {
            let serial = cryptor.encrypt_block(&plain[i], &ivs[i]);
            assert_eq!(out, &serial, "block {i} diverged");
        }
    }

    #[test]
    fn batch_roundtrip() {
        let cryptor = test_cryptor();
        let pool = CipherPool::new(2).unwrap();

        let plain: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i ^ 0x5A; 1024]).collect();
        let ivs: Vec<[u8; IV_SIZE]> = (0..4).map(|_| cryptor.random_iv()).collect();

        let enc_batch: Vec<(&[u8], [u8; IV_SIZE])> = plain
            .iter()
            .zip(&ivs)
            .map(|(p, iv)| (p.as_slice(), *iv))
            .collect();
        let encrypted = pool.encrypt_blocks(&cryptor, &enc_batch);

        let dec_batch: Vec<(&[u8], [u8; IV_SIZE])> = encrypted
            .iter()
            .zip(&ivs)
            .map(|(c, iv)| (c.as_slice(), *iv))
            .collect();
        let decrypted = pool.decrypt_blocks(&cryptor, &dec_batch);

        assert_eq!(decrypted, plain);
    }
}
