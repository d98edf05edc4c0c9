//! # ambertls Cryptographic Provider Interface
//!
//! This crate defines the cryptographic abstraction layer for ambertls.
//! It provides trait-based interfaces that allow pluggable cryptographic
//! backends; `ambertls-crypto-rustcrypto` is the default implementation.
//!
//! ## Architecture
//!
//! ```text
//! CryptoProvider (main trait)
//! ├── Aead (AES-128-GCM, AES-256-GCM, ChaCha20-Poly1305)
//! ├── Hash (SHA-256, SHA-384)
//! ├── Hmac (HMAC with the suite hash)
//! ├── Kdf (HKDF-Extract / HKDF-Expand)
//! ├── Random (CSPRNG)
//! ├── KeyExchange (x25519, secp256r1)
//! └── Signature (ECDSA P-256/P-384, RSA-PSS)
//! ```
//!
//! The trait surface covers exactly what the TLS 1.3 core consumes: the
//! three cipher suites' primitives, the two key-exchange groups, and the
//! three CertificateVerify signature schemes.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_qualifications,
    missing_debug_implementations
)]

pub mod aead;
pub mod error;
pub mod hash;
pub mod hmac;
pub mod kdf;
pub mod key_exchange;
pub mod random;
pub mod signature;

pub use aead::{Aead, AeadAlgorithm};
pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm};
pub use hmac::Hmac;
pub use kdf::{Kdf, KdfAlgorithm};
pub use key_exchange::{KeyExchange, KeyExchangeAlgorithm, PrivateKey, PublicKey, SharedSecret};
pub use random::Random;
pub use signature::{Signature, SignatureScheme};

/// The main cryptographic provider trait.
///
/// Implementations provide all cryptographic operations needed by the
/// TLS core. The trait is object-safe; the core holds it as
/// `&dyn CryptoProvider` so backends can be swapped without generics
/// spreading through the protocol code.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
pub trait CryptoProvider: Send + Sync {
    /// Get an AEAD cipher instance.
    fn aead(&self, algorithm: AeadAlgorithm) -> Result<Box<dyn Aead>>;

    /// Get a streaming hash instance.
    fn hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn Hash>>;

    /// Get an HMAC instance keyed with `key`.
    fn hmac(&self, algorithm: HashAlgorithm, key: &[u8]) -> Result<Box<dyn Hmac>>;

    /// Get an HKDF instance.
    fn kdf(&self, algorithm: KdfAlgorithm) -> Result<Box<dyn Kdf>>;

    /// Get the random number generator.
    fn random(&self) -> &dyn Random;

    /// Get a key exchange instance for `algorithm`.
    fn key_exchange(&self, algorithm: KeyExchangeAlgorithm) -> Result<Box<dyn KeyExchange>>;

    /// Get a signature scheme instance.
    fn signature(&self, scheme: SignatureScheme) -> Result<Box<dyn Signature>>;

    /// Check if the provider supports a specific key exchange group.
    fn supports_key_exchange(&self, algorithm: KeyExchangeAlgorithm) -> bool {
        self.key_exchange(algorithm).is_ok()
    }

    /// Check if the provider supports a specific signature scheme.
    fn supports_signature(&self, scheme: SignatureScheme) -> bool {
        self.signature(scheme).is_ok()
    }
}
