//! Key exchange groups for the TLS 1.3 handshake.

use crate::Result;
use zeroize::Zeroize;

/// Key exchange groups (TLS `NamedGroup` registry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchangeAlgorithm {
    /// X25519 (RFC 7748) - preferred
    X25519,
    /// secp256r1 (NIST P-256)
    Secp256r1,
}

impl KeyExchangeAlgorithm {
    /// Get the public key (key_exchange field) size in bytes.
    ///
    /// secp256r1 shares are uncompressed SEC1 points.
    pub const fn public_key_size(self) -> usize {
        match self {
            KeyExchangeAlgorithm::X25519 => 32,
            KeyExchangeAlgorithm::Secp256r1 => 65,
        }
    }

    /// Get the shared secret size in bytes.
    ///
    /// For secp256r1 this is the big-endian X coordinate, left-padded
    /// with zeros to the field size.
    pub const fn shared_secret_size(self) -> usize {
        32
    }

    /// Convert to the IANA `NamedGroup` codepoint.
    pub const fn to_u16(self) -> u16 {
        match self {
            KeyExchangeAlgorithm::X25519 => 0x001D,
            KeyExchangeAlgorithm::Secp256r1 => 0x0017,
        }
    }

    /// Convert from the IANA `NamedGroup` codepoint.
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x001D => Some(KeyExchangeAlgorithm::X25519),
            0x0017 => Some(KeyExchangeAlgorithm::Secp256r1),
            _ => None,
        }
    }

    /// Get the group name.
    pub const fn name(self) -> &'static str {
        match self {
            KeyExchangeAlgorithm::X25519 => "x25519",
            KeyExchangeAlgorithm::Secp256r1 => "secp256r1",
        }
    }
}

/// Private key for key exchange; zeroized on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey").field("bytes", &"<redacted>").finish()
    }
}

impl PrivateKey {
    /// Create a private key from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Get the private key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Public key for key exchange, in wire format.
#[derive(Debug, Clone)]
pub struct PublicKey {
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Create a public key from wire-format bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Get the public key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Convert to owned bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Shared secret from key exchange; zeroized on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret").field("bytes", &"<redacted>").finish()
    }
}

impl SharedSecret {
    /// Create a shared secret from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Get the shared secret bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Ephemeral Diffie-Hellman key exchange.
pub trait KeyExchange: Send + Sync {
    /// Generate an ephemeral key pair from the provider CSPRNG.
    fn generate_keypair(&self) -> Result<(PrivateKey, PublicKey)>;

    /// Compute the shared secret from our private key and the peer's
    /// wire-format public key.
    fn exchange(&self, private_key: &PrivateKey, peer_public_key: &[u8]) -> Result<SharedSecret>;

    /// Get the group this key exchange implements.
    fn algorithm(&self) -> KeyExchangeAlgorithm;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_codepoints() {
        assert_eq!(KeyExchangeAlgorithm::X25519.to_u16(), 0x001D);
        assert_eq!(KeyExchangeAlgorithm::Secp256r1.to_u16(), 0x0017);
        assert_eq!(
            KeyExchangeAlgorithm::from_u16(0x001D),
            Some(KeyExchangeAlgorithm::X25519)
        );
        assert_eq!(KeyExchangeAlgorithm::from_u16(0x0018), None);
    }

    #[test]
    fn test_private_key_debug_redacted() {
        let key = PrivateKey::from_bytes(vec![1, 2, 3]);
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("[1, 2, 3]"));
    }
}
