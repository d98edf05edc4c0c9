//! Digital signatures for CertificateVerify.

use crate::{HashAlgorithm, Result};

/// Signature schemes (RFC 8446 Section 4.2.3) supported for
/// CertificateVerify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    /// ecdsa_secp256r1_sha256 (0x0403)
    EcdsaSecp256r1Sha256,
    /// ecdsa_secp384r1_sha384 (0x0503)
    EcdsaSecp384r1Sha384,
    /// rsa_pss_rsae_sha256 (0x0804)
    RsaPssRsaeSha256,
}

impl SignatureScheme {
    /// Convert to the IANA codepoint.
    pub const fn to_u16(self) -> u16 {
        match self {
            SignatureScheme::EcdsaSecp256r1Sha256 => 0x0403,
            SignatureScheme::EcdsaSecp384r1Sha384 => 0x0503,
            SignatureScheme::RsaPssRsaeSha256 => 0x0804,
        }
    }

    /// Convert from the IANA codepoint.
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0403 => Some(SignatureScheme::EcdsaSecp256r1Sha256),
            0x0503 => Some(SignatureScheme::EcdsaSecp384r1Sha384),
            0x0804 => Some(SignatureScheme::RsaPssRsaeSha256),
            _ => None,
        }
    }

    /// Get the hash algorithm used by this scheme.
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            SignatureScheme::EcdsaSecp256r1Sha256 => HashAlgorithm::Sha256,
            SignatureScheme::EcdsaSecp384r1Sha384 => HashAlgorithm::Sha384,
            SignatureScheme::RsaPssRsaeSha256 => HashAlgorithm::Sha256,
        }
    }

    /// Get the scheme name.
    pub const fn name(self) -> &'static str {
        match self {
            SignatureScheme::EcdsaSecp256r1Sha256 => "ecdsa_secp256r1_sha256",
            SignatureScheme::EcdsaSecp384r1Sha384 => "ecdsa_secp384r1_sha384",
            SignatureScheme::RsaPssRsaeSha256 => "rsa_pss_rsae_sha256",
        }
    }
}

/// Signing and verification for one signature scheme.
///
/// Key material is passed in raw form; key file parsing is the caller's
/// concern. ECDSA private keys are raw field scalars, RSA private keys
/// are PKCS#8 DER. Public keys are uncompressed SEC1 points (ECDSA) or
/// PKCS#1 DER (RSA).
pub trait Signature: Send + Sync {
    /// Sign `message` with the private key.
    ///
    /// ECDSA signatures are DER-encoded; RSA-PSS uses a salt length
    /// equal to the digest length, as TLS 1.3 requires.
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>>;

    /// Verify `signature` over `message` with the public key.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()>;

    /// Get the scheme this instance implements.
    fn algorithm(&self) -> SignatureScheme;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_codepoints() {
        assert_eq!(SignatureScheme::EcdsaSecp256r1Sha256.to_u16(), 0x0403);
        assert_eq!(SignatureScheme::EcdsaSecp384r1Sha384.to_u16(), 0x0503);
        assert_eq!(SignatureScheme::RsaPssRsaeSha256.to_u16(), 0x0804);
        assert_eq!(SignatureScheme::from_u16(0x0807), None);
    }

    #[test]
    fn test_scheme_hashes() {
        assert_eq!(
            SignatureScheme::EcdsaSecp384r1Sha384.hash_algorithm(),
            HashAlgorithm::Sha384
        );
        assert_eq!(
            SignatureScheme::RsaPssRsaeSha256.hash_algorithm(),
            HashAlgorithm::Sha256
        );
    }
}
