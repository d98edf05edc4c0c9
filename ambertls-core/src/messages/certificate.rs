//! Certificate message (RFC 8446 Section 4.4.2).

use crate::codec::{put_u24, Reader};
use crate::error::{Error, Result};
use crate::extensions::Extensions;

/// One certificate with its per-certificate extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    /// DER-encoded X.509 certificate
    pub cert_data: Vec<u8>,

    /// Per-certificate extensions (status_request etc., unused here)
    pub extensions: Extensions,
}

impl CertificateEntry {
    /// Create an entry with no extensions.
    pub fn new(cert_data: Vec<u8>) -> Self {
        Self {
            cert_data,
            extensions: Extensions::new(),
        }
    }
}

/// Certificate message.
///
/// ```text
/// struct {
///     opaque certificate_request_context<0..2^8-1>;
///     CertificateEntry certificate_list<0..2^24-1>;
/// } Certificate;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Echo of the CertificateRequest context (empty for server
    /// certificates in the main handshake)
    pub context: Vec<u8>,

    /// The chain, end-entity first
    pub certificate_list: Vec<CertificateEntry>,
}

impl Certificate {
    /// Create a certificate message from a DER chain, end-entity first.
    pub fn from_chain(chain: &[Vec<u8>]) -> Self {
        Self {
            context: Vec::new(),
            certificate_list: chain.iter().cloned().map(CertificateEntry::new).collect(),
        }
    }

    /// An empty certificate message (client response to an unanswerable
    /// CertificateRequest).
    pub fn empty(context: Vec<u8>) -> Self {
        Self {
            context,
            certificate_list: Vec::new(),
        }
    }

    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.context.len() > 255 {
            return Err(Error::InternalError("certificate context too long".to_string()));
        }

        let mut list = Vec::new();
        for entry in &self.certificate_list {
            put_u24(&mut list, entry.cert_data.len())?;
            list.extend_from_slice(&entry.cert_data);
            list.extend_from_slice(&entry.extensions.encode());
        }

        let mut buf = Vec::with_capacity(4 + self.context.len() + list.len());
        buf.push(self.context.len() as u8);
        buf.extend_from_slice(&self.context);
        put_u24(&mut buf, list.len())?;
        buf.extend_from_slice(&list);
        Ok(buf)
    }

    /// Decode the body from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let context = reader.take_vec8()?.to_vec();

        let mut list_reader = Reader::new(reader.take_vec24()?);
        reader.expect_end("Certificate")?;

        let mut certificate_list = Vec::new();
        while !list_reader.is_empty() {
            let cert_data = list_reader.take_vec24()?.to_vec();
            if cert_data.is_empty() {
                return Err(Error::DecodeError("empty certificate entry".into()));
            }
            let extensions = Extensions::decode(&mut list_reader)?;
            certificate_list.push(CertificateEntry {
                cert_data,
                extensions,
            });
        }

        Ok(Self {
            context,
            certificate_list,
        })
    }

    /// DER chain, end-entity first.
    pub fn der_chain(&self) -> Vec<Vec<u8>> {
        self.certificate_list.iter().map(|e| e.cert_data.clone()).collect()
    }
}
