//! Error types for the crypto provider interface.

use core::fmt;

/// Result type for provider operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors produced by crypto providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested algorithm is not supported by this provider.
    UnsupportedAlgorithm(String),

    /// Key size does not match the algorithm.
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Nonce size does not match the algorithm.
    InvalidNonceSize {
        /// Expected nonce size in bytes
        expected: usize,
        /// Actual nonce size in bytes
        actual: usize,
    },

    /// AEAD tag verification failed.
    AuthenticationFailed,

    /// Peer public key was rejected (wrong length, not on curve).
    InvalidPublicKey,

    /// Private key material was rejected.
    InvalidPrivateKey,

    /// Signature verification failed.
    VerificationFailed,

    /// The random source failed.
    RandomSourceFailed,

    /// Other provider-internal failure.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnsupportedAlgorithm(alg) => write!(f, "unsupported algorithm: {}", alg),
            Error::InvalidKeySize { expected, actual } => {
                write!(f, "invalid key size: expected {}, got {}", expected, actual)
            }
            Error::InvalidNonceSize { expected, actual } => {
                write!(f, "invalid nonce size: expected {}, got {}", expected, actual)
            }
            Error::AuthenticationFailed => write!(f, "AEAD authentication failed"),
            Error::InvalidPublicKey => write!(f, "invalid public key"),
            Error::InvalidPrivateKey => write!(f, "invalid private key"),
            Error::VerificationFailed => write!(f, "signature verification failed"),
            Error::RandomSourceFailed => write!(f, "random source failed"),
            Error::Internal(msg) => write!(f, "internal crypto error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
