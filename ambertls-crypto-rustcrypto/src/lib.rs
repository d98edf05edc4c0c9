//! # RustCrypto Provider for ambertls
//!
//! This crate implements the [`ambertls_crypto::CryptoProvider`]
//! interface on top of the RustCrypto ecosystem:
//!
//! - **AEAD**: AES-128-GCM, AES-256-GCM (`aes-gcm`), ChaCha20-Poly1305
//!   (`chacha20poly1305`)
//! - **Hash / HMAC / HKDF**: SHA-256, SHA-384 (`sha2`, `hmac`, `hkdf`)
//! - **Key exchange**: X25519 (`x25519-dalek`), secp256r1 (`p256`)
//! - **Signatures**: ECDSA P-256/P-384 (`p256`, `p384`), RSA-PSS (`rsa`)
//! - **RNG**: operating-system CSPRNG (`rand`)
//!
//! ## Example
//!
//! ```rust
//! use ambertls_crypto::{AeadAlgorithm, CryptoProvider};
//! use ambertls_crypto_rustcrypto::RustCryptoProvider;
//!
//! let provider = RustCryptoProvider::new();
//! let aead = provider.aead(AeadAlgorithm::Aes128Gcm).unwrap();
//! assert_eq!(aead.key_size(), 16);
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_qualifications,
    missing_debug_implementations
)]

use ambertls_crypto::{
    Aead, AeadAlgorithm, CryptoProvider, Hash, HashAlgorithm, Hmac, Kdf, KdfAlgorithm,
    KeyExchange, KeyExchangeAlgorithm, Random, Result, Signature, SignatureScheme,
};

pub mod aead;
pub mod hash;
pub mod hmac;
pub mod kdf;
pub mod kex;
pub mod random;
pub mod signature;

use random::OsRandom;

/// Crypto provider backed by the RustCrypto crates.
#[derive(Debug, Default)]
pub struct RustCryptoProvider {
    random: OsRandom,
}

impl RustCryptoProvider {
    /// Create a new provider instance.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CryptoProvider for RustCryptoProvider {
    fn aead(&self, algorithm: AeadAlgorithm) -> Result<Box<dyn Aead>> {
        aead::create_aead(algorithm)
    }

    fn hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn Hash>> {
        hash::create_hash(algorithm)
    }

    fn hmac(&self, algorithm: HashAlgorithm, key: &[u8]) -> Result<Box<dyn Hmac>> {
        hmac::create_hmac(algorithm, key)
    }

    fn kdf(&self, algorithm: KdfAlgorithm) -> Result<Box<dyn Kdf>> {
        kdf::create_kdf(algorithm)
    }

    fn random(&self) -> &dyn Random {
        &self.random
    }

    fn key_exchange(&self, algorithm: KeyExchangeAlgorithm) -> Result<Box<dyn KeyExchange>> {
        kex::create_key_exchange(algorithm)
    }

    fn signature(&self, scheme: SignatureScheme) -> Result<Box<dyn Signature>> {
        signature::create_signature(scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_covers_all_suites() {
        let provider = RustCryptoProvider::new();
        for alg in [
            AeadAlgorithm::Aes128Gcm,
            AeadAlgorithm::Aes256Gcm,
            AeadAlgorithm::ChaCha20Poly1305,
        ] {
            assert!(provider.aead(alg).is_ok());
        }
        for group in [KeyExchangeAlgorithm::X25519, KeyExchangeAlgorithm::Secp256r1] {
            assert!(provider.supports_key_exchange(group));
        }
        for scheme in [
            SignatureScheme::EcdsaSecp256r1Sha256,
            SignatureScheme::EcdsaSecp384r1Sha384,
            SignatureScheme::RsaPssRsaeSha256,
        ] {
            assert!(provider.supports_signature(scheme));
        }
    }
}
