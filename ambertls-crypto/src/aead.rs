//! AEAD (Authenticated Encryption with Associated Data) cipher interface.

use crate::Result;

/// AEAD cipher algorithms for the supported TLS 1.3 cipher suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadAlgorithm {
    /// AES-128-GCM (mandatory to implement)
    Aes128Gcm,
    /// AES-256-GCM
    Aes256Gcm,
    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    /// Get the key size in bytes.
    pub const fn key_size(self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm => 16,
            AeadAlgorithm::Aes256Gcm => 32,
            AeadAlgorithm::ChaCha20Poly1305 => 32,
        }
    }

    /// Get the nonce size in bytes.
    ///
    /// All TLS 1.3 AEAD ciphers use 96-bit nonces.
    pub const fn nonce_size(self) -> usize {
        12
    }

    /// Get the authentication tag size in bytes.
    pub const fn tag_size(self) -> usize {
        16
    }

    /// Get the name as used in TLS cipher suite names.
    pub const fn name(self) -> &'static str {
        match self {
            AeadAlgorithm::Aes128Gcm => "AES_128_GCM",
            AeadAlgorithm::Aes256Gcm => "AES_256_GCM",
            AeadAlgorithm::ChaCha20Poly1305 => "CHACHA20_POLY1305",
        }
    }
}

/// AEAD cipher.
///
/// # Security
///
/// - Nonces MUST NOT repeat under the same key; the record layer
///   guarantees this by deriving nonces from the sequence number.
/// - Tag verification MUST be constant-time.
pub trait Aead: Send + Sync {
    /// Encrypt and authenticate `plaintext`.
    ///
    /// Returns the ciphertext with the authentication tag appended.
    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt and verify `ciphertext` (tag appended).
    ///
    /// Returns the plaintext, or [`crate::Error::AuthenticationFailed`]
    /// if the tag does not verify.
    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Get the algorithm this cipher implements.
    fn algorithm(&self) -> AeadAlgorithm;

    /// Get the key size in bytes.
    fn key_size(&self) -> usize {
        self.algorithm().key_size()
    }

    /// Get the nonce size in bytes.
    fn nonce_size(&self) -> usize {
        self.algorithm().nonce_size()
    }

    /// Get the authentication tag size in bytes.
    fn tag_size(&self) -> usize {
        self.algorithm().tag_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parameters() {
        assert_eq!(AeadAlgorithm::Aes128Gcm.key_size(), 16);
        assert_eq!(AeadAlgorithm::Aes256Gcm.key_size(), 32);
        assert_eq!(AeadAlgorithm::ChaCha20Poly1305.key_size(), 32);
        for alg in [
            AeadAlgorithm::Aes128Gcm,
            AeadAlgorithm::Aes256Gcm,
            AeadAlgorithm::ChaCha20Poly1305,
        ] {
            assert_eq!(alg.nonce_size(), 12);
            assert_eq!(alg.tag_size(), 16);
        }
    }
}
