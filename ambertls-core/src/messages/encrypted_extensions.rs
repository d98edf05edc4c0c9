//! EncryptedExtensions message (RFC 8446 Section 4.3.1).

use crate::codec::Reader;
use crate::error::Result;
use crate::extensions::Extensions;

/// EncryptedExtensions message.
///
/// The first message protected under the handshake keys; carries the
/// extensions that need no cryptographic negotiation (server_name ack,
/// ALPN selection, record_size_limit, early_data acceptance,
/// supported_groups).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedExtensions {
    /// Extensions
    pub extensions: Extensions,
}

impl EncryptedExtensions {
    /// Create a new EncryptedExtensions message.
    pub fn new(extensions: Extensions) -> Self {
        Self { extensions }
    }

    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.extensions.encode())
    }

    /// Decode the body from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let extensions = Extensions::decode(&mut reader)?;
        reader.expect_end("EncryptedExtensions")?;
        Ok(Self { extensions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::Extension;
    use crate::protocol::ExtensionType;

    #[test]
    fn test_encrypted_extensions_roundtrip() {
        let mut extensions = Extensions::new();
        extensions.add(Extension::new(ExtensionType::EarlyData, vec![]));
        let ee = EncryptedExtensions::new(extensions);
        let decoded = EncryptedExtensions::decode(&ee.encode().unwrap()).unwrap();
        assert_eq!(decoded, ee);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = EncryptedExtensions::new(Extensions::new()).encode().unwrap();
        encoded.push(0);
        assert!(EncryptedExtensions::decode(&encoded).is_err());
    }
}
