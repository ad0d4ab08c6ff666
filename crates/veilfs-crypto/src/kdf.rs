//! Key derivation: PBKDF2-HMAC-SHA256, key material → 256-bit working key

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::cipher::CryptoError;
use crate::{KEY_SIZE, PBKDF2_ITERATIONS};

/// A 256-bit working key.
///
/// Zeroized on drop so the key does not linger in freed memory; Debug output
/// is redacted so the key cannot leak through logging.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKey {
    bytes: [u8; KEY_SIZE],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// PBKDF2 parameters.
#[derive(Debug, Clone)]
pub struct KdfParams {
    /// Iteration count (default: 10_000).
    pub iterations: u32,
    /// Derived key length in bytes; the block cipher requires 32.
    pub key_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
            key_len: KEY_SIZE,
        }
    }
}

/// Derive a working key from arbitrary key material.
///
/// Derivation is unconditional: material that is already a derived key goes
/// through PBKDF2 again. The same material and salt always produce the same
/// key, which is what lets a second instance reopen files written by the
/// first.
pub fn derive_key(
    material: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<MasterKey, CryptoError> {
    if params.iterations == 0 {
        return Err(CryptoError::InvalidParams(
            "PBKDF2 iteration count must be nonzero".into(),
        ));
    }
    if params.key_len != KEY_SIZE {
        return Err(CryptoError::InvalidParams(format!(
            "derived key length must be {KEY_SIZE} bytes, got {}",
            params.key_len
        )));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(material, salt, params.iterations, &mut key);
    Ok(MasterKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fast params so the suite does not burn CPU on iteration count.
    fn fast() -> KdfParams {
        KdfParams {
            iterations: 10,
            key_len: KEY_SIZE,
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let k1 = derive_key(b"secret material", b"salt", &fast()).unwrap();
        let k2 = derive_key(b"secret material", b"salt", &fast()).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_material_different_key() {
        let k1 = derive_key(b"material-a", b"salt", &fast()).unwrap();
        let k2 = derive_key(b"material-b", b"salt", &fast()).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_salt_different_key() {
        let k1 = derive_key(b"material", b"salt-a", &fast()).unwrap();
        let k2 = derive_key(b"material", b"salt-b", &fast()).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn derived_key_goes_through_pbkdf2_again() {
        // Supplying an already-derived key is not a passthrough.
        let k1 = derive_key(b"material", b"salt", &fast()).unwrap();
        let k2 = derive_key(k1.as_bytes(), b"salt", &fast()).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn zero_iterations_rejected() {
        let params = KdfParams {
            iterations: 0,
            key_len: KEY_SIZE,
        };
        assert!(derive_key(b"m", b"s", &params).is_err());
    }

    #[test]
    fn wrong_key_len_rejected() {
        let params = KdfParams {
            iterations: 10,
            key_len: 16,
        };
        assert!(derive_key(b"m", b"s", &params).is_err());
    }

    #[test]
    fn debug_is_redacted() {
        let key = derive_key(b"material", b"salt", &fast()).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
    }
}
