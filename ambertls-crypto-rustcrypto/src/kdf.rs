//! HKDF implementations backed by the `hkdf` crate.

use ambertls_crypto::{Error, Kdf, KdfAlgorithm, Result};
use hkdf::Hkdf;
use sha2::{Sha256, Sha384};

/// Create an HKDF instance for the given algorithm.
pub fn create_kdf(algorithm: KdfAlgorithm) -> Result<Box<dyn Kdf>> {
    match algorithm {
        KdfAlgorithm::HkdfSha256 => Ok(Box::new(HkdfSha256Impl)),
        KdfAlgorithm::HkdfSha384 => Ok(Box::new(HkdfSha384Impl)),
    }
}

struct HkdfSha256Impl;

impl Kdf for HkdfSha256Impl {
    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
        let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
        prk.to_vec()
    }

    fn expand(&self, prk: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>> {
        let hk = Hkdf::<Sha256>::from_prk(prk)
            .map_err(|_| Error::Internal("HKDF PRK too short".to_string()))?;
        let mut okm = vec![0u8; length];
        hk.expand(info, &mut okm)
            .map_err(|_| Error::Internal("HKDF-Expand length too large".to_string()))?;
        Ok(okm)
    }

    fn algorithm(&self) -> KdfAlgorithm {
        KdfAlgorithm::HkdfSha256
    }
}

struct HkdfSha384Impl;

impl Kdf for HkdfSha384Impl {
    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
        let (prk, _) = Hkdf::<Sha384>::extract(Some(salt), ikm);
        prk.to_vec()
    }

    fn expand(&self, prk: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>> {
        let hk = Hkdf::<Sha384>::from_prk(prk)
            .map_err(|_| Error::Internal("HKDF PRK too short".to_string()))?;
        let mut okm = vec![0u8; length];
        hk.expand(info, &mut okm)
            .map_err(|_| Error::Internal("HKDF-Expand length too large".to_string()))?;
        Ok(okm)
    }

    fn algorithm(&self) -> KdfAlgorithm {
        KdfAlgorithm::HkdfSha384
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_decode(hex: &str) -> Vec<u8> {
        let clean: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
        (0..clean.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&clean[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_hkdf_extract_all_zero() {
        // HKDF-Extract(0^32, 0^32) with SHA-256, the TLS 1.3 early secret
        // with no PSK (RFC 8448 Section 3).
        let kdf = create_kdf(KdfAlgorithm::HkdfSha256).unwrap();
        let prk = kdf.extract(&[0u8; 32], &[0u8; 32]);
        assert_eq!(
            prk,
            hex_decode("33ad0a1c607ec03b09e6cd9893680ce210adf300aa1f2660e1b22e10f170f92a")
        );
    }

    #[test]
    fn test_hkdf_expand_length() {
        let kdf = create_kdf(KdfAlgorithm::HkdfSha384).unwrap();
        let prk = kdf.extract(b"salt", b"ikm");
        assert_eq!(prk.len(), 48);
        let okm = kdf.expand(&prk, b"info", 72).unwrap();
        assert_eq!(okm.len(), 72);
    }
}
