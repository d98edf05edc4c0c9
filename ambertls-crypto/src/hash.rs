//! Cryptographic hash interface.

use crate::Result;

/// Hash algorithms used by the TLS 1.3 cipher suites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-256 (AES_128_GCM_SHA256, CHACHA20_POLY1305_SHA256)
    Sha256,
    /// SHA-384 (AES_256_GCM_SHA384)
    Sha384,
}

impl HashAlgorithm {
    /// Get the digest output size in bytes.
    pub const fn output_size(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }

    /// Get the algorithm name.
    pub const fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
        }
    }
}

/// Streaming hash function.
///
/// Instances are single-use: feed data with [`Hash::update`] and consume
/// the instance with [`Hash::finalize`].
pub trait Hash: Send {
    /// Feed data into the hash state.
    fn update(&mut self, data: &[u8]);

    /// Finish and return the digest.
    fn finalize(self: Box<Self>) -> Vec<u8>;

    /// Get the algorithm this hash implements.
    fn algorithm(&self) -> HashAlgorithm;

    /// Get the digest output size in bytes.
    fn output_size(&self) -> usize {
        self.algorithm().output_size()
    }
}

/// Convenience: hash a complete message in one call.
pub fn digest(provider: &dyn crate::CryptoProvider, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    let mut hasher = provider.hash(algorithm)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_sizes() {
        assert_eq!(HashAlgorithm::Sha256.output_size(), 32);
        assert_eq!(HashAlgorithm::Sha384.output_size(), 48);
    }
}
