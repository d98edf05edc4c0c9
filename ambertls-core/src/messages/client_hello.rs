//! ClientHello message (RFC 8446 Section 4.1.2).

use crate::cipher::CipherSuite;
use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::extensions::Extensions;
use crate::protocol::ProtocolVersion;
use bytes::{BufMut, BytesMut};

/// ClientHello message.
///
/// ```text
/// struct {
///     ProtocolVersion legacy_version = 0x0303;    /* TLS v1.2 */
///     Random random;
///     opaque legacy_session_id<0..32>;
///     CipherSuite cipher_suites<2..2^16-2>;
///     opaque legacy_compression_methods<1..2^8-1>;
///     Extension extensions<8..2^16-1>;
/// } ClientHello;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Legacy version, always 0x0303
    pub legacy_version: ProtocolVersion,

    /// Random bytes (32 bytes)
    pub random: [u8; 32],

    /// Legacy session ID, echoed verbatim by the server
    pub legacy_session_id: Vec<u8>,

    /// Cipher suites in preference order
    pub cipher_suites: Vec<CipherSuite>,

    /// Extensions
    pub extensions: Extensions,
}

impl ClientHello {
    /// Create a new ClientHello.
    pub fn new(random: [u8; 32], cipher_suites: Vec<CipherSuite>) -> Self {
        Self {
            legacy_version: ProtocolVersion::Tls12,
            random,
            legacy_session_id: Vec::new(),
            cipher_suites,
            extensions: Extensions::new(),
        }
    }

    /// Set the legacy session ID (compatibility mode).
    pub fn with_session_id(mut self, session_id: Vec<u8>) -> Self {
        self.legacy_session_id = session_id;
        self
    }

    /// Set the extensions.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();

        buf.put_u16(self.legacy_version.to_u16());
        buf.put_slice(&self.random);

        if self.legacy_session_id.len() > 32 {
            return Err(Error::InternalError("session ID too long".to_string()));
        }
        buf.put_u8(self.legacy_session_id.len() as u8);
        buf.put_slice(&self.legacy_session_id);

        if self.cipher_suites.is_empty() {
            return Err(Error::InternalError("no cipher suites".to_string()));
        }
        buf.put_u16((self.cipher_suites.len() * 2) as u16);
        for suite in &self.cipher_suites {
            buf.put_u16(suite.to_u16());
        }

        // legacy_compression_methods is always the single null method.
        buf.put_u8(1);
        buf.put_u8(0);

        buf.put_slice(&self.extensions.encode());
        Ok(buf.to_vec())
    }

    /// Decode the body from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let version_raw = reader.take_u16()?;
        let legacy_version = ProtocolVersion::from_u16(version_raw).ok_or_else(|| {
            Error::DecodeError(format!("invalid legacy_version 0x{:04x}", version_raw))
        })?;

        let mut random = [0u8; 32];
        random.copy_from_slice(reader.take(32)?);

        let legacy_session_id = reader.take_vec8()?.to_vec();
        if legacy_session_id.len() > 32 {
            return Err(Error::DecodeError("session ID too long".into()));
        }

        let mut suites_reader = Reader::new(reader.take_vec16()?);
        if suites_reader.remaining() == 0 || suites_reader.remaining() % 2 != 0 {
            return Err(Error::DecodeError("invalid cipher suite list length".into()));
        }
        let mut cipher_suites = Vec::new();
        while !suites_reader.is_empty() {
            // Unknown cipher suites are skipped, not fatal.
            if let Some(suite) = CipherSuite::from_u16(suites_reader.take_u16()?) {
                cipher_suites.push(suite);
            }
        }

        let compression = reader.take_vec8()?;
        if compression != [0] {
            return Err(Error::IllegalParameter(
                "legacy_compression_methods must be the single null method".to_string(),
            ));
        }

        let extensions = Extensions::decode(&mut reader)?;
        reader.expect_end("ClientHello")?;
        extensions.check_pre_shared_key_last()?;

        Ok(Self {
            legacy_version,
            random,
            legacy_session_id,
            cipher_suites,
            extensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::Extension;
    use crate::protocol::ExtensionType;

    fn hello() -> ClientHello {
        let mut extensions = Extensions::new();
        extensions.add(Extension::new(ExtensionType::SupportedVersions, vec![2, 3, 4]));
        ClientHello::new(
            [0x42; 32],
            vec![CipherSuite::Aes128GcmSha256, CipherSuite::ChaCha20Poly1305Sha256],
        )
        .with_session_id(vec![0x01, 0x02, 0x03])
        .with_extensions(extensions)
    }

    #[test]
    fn test_client_hello_roundtrip() {
        let hello = hello();
        let decoded = ClientHello::decode(&hello.encode().unwrap()).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn test_unknown_cipher_suites_skipped() {
        let hello = hello();
        let mut encoded = hello.encode().unwrap();
        // Patch the suite list to (0x1301, 0x1399): the second is unknown.
        let offset = 2 + 32 + 1 + 3 + 2;
        encoded[offset + 2] = 0x13;
        encoded[offset + 3] = 0x99;
        let decoded = ClientHello::decode(&encoded).unwrap();
        assert_eq!(decoded.cipher_suites, vec![CipherSuite::Aes128GcmSha256]);
    }

    #[test]
    fn test_nonzero_compression_rejected() {
        let hello = hello();
        let mut encoded = hello.encode().unwrap();
        let offset = 2 + 32 + 1 + 3 + 2 + 4 + 1;
        assert_eq!(encoded[offset], 0);
        encoded[offset] = 1;
        assert!(matches!(
            ClientHello::decode(&encoded),
            Err(Error::IllegalParameter(_))
        ));
    }

    #[test]
    fn test_psk_not_last_rejected() {
        let mut extensions = Extensions::new();
        extensions.add(Extension::new(ExtensionType::PreSharedKey, vec![0; 4]));
        extensions.add(Extension::new(ExtensionType::KeyShare, vec![0, 0]));
        let hello = ClientHello::new([0; 32], vec![CipherSuite::Aes128GcmSha256])
            .with_extensions(extensions);
        assert!(ClientHello::decode(&hello.encode().unwrap()).is_err());
    }

    #[test]
    fn test_truncated_rejected() {
        let encoded = hello().encode().unwrap();
        assert!(ClientHello::decode(&encoded[..20]).is_err());
    }
}
