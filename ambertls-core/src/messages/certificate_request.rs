//! CertificateRequest message (RFC 8446 Section 4.3.2).
//!
//! Parsed so a client can answer with an empty Certificate; this
//! implementation never sends one.

use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::extensions::Extensions;
use crate::protocol::ExtensionType;

/// CertificateRequest message.
///
/// ```text
/// struct {
///     opaque certificate_request_context<0..2^8-1>;
///     Extension extensions<2..2^16-1>;
/// } CertificateRequest;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    /// Context echoed in the client's Certificate response
    pub context: Vec<u8>,

    /// Extensions; signature_algorithms is mandatory
    pub extensions: Extensions,
}

impl CertificateRequest {
    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.context.len() > 255 {
            return Err(Error::InternalError("request context too long".to_string()));
        }
        let mut buf = Vec::new();
        buf.push(self.context.len() as u8);
        buf.extend_from_slice(&self.context);
        buf.extend_from_slice(&self.extensions.encode());
        Ok(buf)
    }

    /// Decode the body from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let context = reader.take_vec8()?.to_vec();
        let extensions = Extensions::decode(&mut reader)?;
        reader.expect_end("CertificateRequest")?;

        if !extensions.has(ExtensionType::SignatureAlgorithms) {
            return Err(Error::MissingExtension(
                "CertificateRequest without signature_algorithms".to_string(),
            ));
        }

        Ok(Self { context, extensions })
    }
}
