//! CertificateVerify message (RFC 8446 Section 4.4.3).

use crate::codec::Reader;
use crate::error::{Error, Result};
use ambertls_crypto::SignatureScheme;

/// Context string for server signatures.
const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

/// Context string for client signatures.
const CLIENT_CONTEXT: &[u8] = b"TLS 1.3, client CertificateVerify";

/// CertificateVerify message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    /// Signature scheme
    pub algorithm: SignatureScheme,

    /// Signature over the transcript, in the scheme's wire form
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    /// Create a new CertificateVerify.
    pub fn new(algorithm: SignatureScheme, signature: Vec<u8>) -> Self {
        Self { algorithm, signature }
    }

    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.signature.len() > 0xFFFF {
            return Err(Error::InternalError("signature too large".to_string()));
        }
        let mut buf = Vec::with_capacity(4 + self.signature.len());
        buf.extend_from_slice(&self.algorithm.to_u16().to_be_bytes());
        buf.extend_from_slice(&(self.signature.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.signature);
        Ok(buf)
    }

    /// Decode the body from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let alg_raw = reader.take_u16()?;
        let algorithm = SignatureScheme::from_u16(alg_raw).ok_or_else(|| {
            Error::IllegalParameter(format!("unknown signature scheme 0x{:04x}", alg_raw))
        })?;
        let signature = reader.take_vec16()?.to_vec();
        reader.expect_end("CertificateVerify")?;
        Ok(Self { algorithm, signature })
    }
}

/// Build the signed content for a CertificateVerify signature
/// (RFC 8446 Section 4.4.3):
///
/// ```text
/// 64 * 0x20 || context string || 0x00 || Transcript-Hash
/// ```
pub fn signed_content(server: bool, transcript_hash: &[u8]) -> Vec<u8> {
    let context = if server { SERVER_CONTEXT } else { CLIENT_CONTEXT };
    let mut content = Vec::with_capacity(64 + context.len() + 1 + transcript_hash.len());
    content.extend_from_slice(&[0x20; 64]);
    content.extend_from_slice(context);
    content.push(0x00);
    content.extend_from_slice(transcript_hash);
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_verify_roundtrip() {
        let message =
            CertificateVerify::new(SignatureScheme::EcdsaSecp256r1Sha256, vec![0x30, 0x45, 0x02]);
        let decoded = CertificateVerify::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        // ed25519 (0x0807) is outside this implementation's set.
        let raw = [0x08, 0x07, 0x00, 0x01, 0xAA];
        assert!(CertificateVerify::decode(&raw).is_err());
    }

    #[test]
    fn test_signed_content_layout() {
        let content = signed_content(true, &[0xAB; 32]);
        assert_eq!(&content[..64], &[0x20; 64]);
        assert_eq!(&content[64..97], b"TLS 1.3, server CertificateVerify");
        assert_eq!(content[97], 0x00);
        assert_eq!(&content[98..], &[0xAB; 32]);

        // Client and server contexts must differ.
        assert_ne!(content, signed_content(false, &[0xAB; 32]));
    }
}
