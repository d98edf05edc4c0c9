//! Cipher suite definitions and operations.

use ambertls_crypto::{AeadAlgorithm, HashAlgorithm};

/// TLS 1.3 cipher suite.
///
/// TLS 1.3 cipher suites only fix the AEAD cipher and the hash used for
/// the key schedule and transcript; key exchange and signatures are
/// negotiated separately via extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CipherSuite {
    /// TLS_AES_128_GCM_SHA256 (mandatory to implement)
    Aes128GcmSha256 = 0x1301,

    /// TLS_AES_256_GCM_SHA384
    Aes256GcmSha384 = 0x1302,

    /// TLS_CHACHA20_POLY1305_SHA256
    ChaCha20Poly1305Sha256 = 0x1303,
}

impl CipherSuite {
    /// Create from wire format (u16).
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1301 => Some(CipherSuite::Aes128GcmSha256),
            0x1302 => Some(CipherSuite::Aes256GcmSha384),
            0x1303 => Some(CipherSuite::ChaCha20Poly1305Sha256),
            _ => None,
        }
    }

    /// Convert to wire format (u16).
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Get the AEAD algorithm for this cipher suite.
    pub const fn aead_algorithm(self) -> AeadAlgorithm {
        match self {
            CipherSuite::Aes128GcmSha256 => AeadAlgorithm::Aes128Gcm,
            CipherSuite::Aes256GcmSha384 => AeadAlgorithm::Aes256Gcm,
            CipherSuite::ChaCha20Poly1305Sha256 => AeadAlgorithm::ChaCha20Poly1305,
        }
    }

    /// Get the hash algorithm for this cipher suite.
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            CipherSuite::Aes128GcmSha256 | CipherSuite::ChaCha20Poly1305Sha256 => {
                HashAlgorithm::Sha256
            }
            CipherSuite::Aes256GcmSha384 => HashAlgorithm::Sha384,
        }
    }

    /// Get the hash output length in bytes.
    pub const fn hash_len(self) -> usize {
        self.hash_algorithm().output_size()
    }

    /// Get the AEAD key length for this cipher suite.
    pub const fn key_length(self) -> usize {
        self.aead_algorithm().key_size()
    }

    /// Get the per-record IV length.
    ///
    /// All TLS 1.3 AEAD ciphers use 12-byte nonces.
    pub const fn iv_length(self) -> usize {
        12
    }

    /// Get the cipher suite name.
    pub const fn name(self) -> &'static str {
        match self {
            CipherSuite::Aes128GcmSha256 => "TLS_AES_128_GCM_SHA256",
            CipherSuite::Aes256GcmSha384 => "TLS_AES_256_GCM_SHA384",
            CipherSuite::ChaCha20Poly1305Sha256 => "TLS_CHACHA20_POLY1305_SHA256",
        }
    }
}

/// Default cipher suite preference order.
pub const DEFAULT_CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::Aes128GcmSha256,
    CipherSuite::ChaCha20Poly1305Sha256,
    CipherSuite::Aes256GcmSha384,
];
