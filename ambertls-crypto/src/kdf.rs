//! HKDF key derivation interface.

use crate::{HashAlgorithm, Result};

/// KDF algorithms used by the TLS 1.3 key schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfAlgorithm {
    /// HKDF with SHA-256
    HkdfSha256,
    /// HKDF with SHA-384
    HkdfSha384,
}

impl KdfAlgorithm {
    /// Get the underlying hash algorithm.
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            KdfAlgorithm::HkdfSha256 => HashAlgorithm::Sha256,
            KdfAlgorithm::HkdfSha384 => HashAlgorithm::Sha384,
        }
    }
}

impl HashAlgorithm {
    /// Get the HKDF variant built on this hash.
    pub const fn to_kdf_algorithm(self) -> KdfAlgorithm {
        match self {
            HashAlgorithm::Sha256 => KdfAlgorithm::HkdfSha256,
            HashAlgorithm::Sha384 => KdfAlgorithm::HkdfSha384,
        }
    }
}

/// HKDF (RFC 5869) as used by the TLS 1.3 key schedule.
pub trait Kdf: Send + Sync {
    /// HKDF-Extract: derive a pseudorandom key from input key material.
    ///
    /// Returns a PRK of `hash_output_size` bytes.
    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8>;

    /// HKDF-Expand: expand a PRK to `length` bytes of output key material.
    ///
    /// Fails if `length > 255 * hash_output_size`.
    fn expand(&self, prk: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>>;

    /// Get the KDF algorithm.
    fn algorithm(&self) -> KdfAlgorithm;

    /// Get the output size of the underlying hash function.
    fn hash_output_size(&self) -> usize {
        self.algorithm().hash_algorithm().output_size()
    }
}
