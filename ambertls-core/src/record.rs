//! TLS record framing.
//!
//! ```text
//! struct {
//!     ContentType type;
//!     ProtocolVersion legacy_record_version = 0x0303;
//!     uint16 length;
//!     opaque fragment[TLSPlaintext.length];
//! } TLSPlaintext;
//! ```
//!
//! Unprotected records carry the real content type; protected records
//! ([`crate::record_protection::TlsCiphertext`]) always carry
//! `application_data` in the header.

use crate::error::{Error, Result};
use crate::protocol::{ContentType, ProtocolVersion};

/// Maximum plaintext fragment size (2^14).
pub const MAX_FRAGMENT_SIZE: usize = 16384;

/// Maximum protected record payload size (2^14 + 256).
pub const MAX_CIPHERTEXT_SIZE: usize = MAX_FRAGMENT_SIZE + 256;

/// TLS record header size (5 bytes).
pub const RECORD_HEADER_SIZE: usize = 5;

/// Unprotected TLS record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPlaintext {
    /// Content type
    pub content_type: ContentType,

    /// Protocol version (legacy field, 0x0303; 0x0301 tolerated on the
    /// first ClientHello record)
    pub version: ProtocolVersion,

    /// Fragment data
    pub fragment: Vec<u8>,
}

impl TlsPlaintext {
    /// Create a new plaintext record.
    pub fn new(content_type: ContentType, version: ProtocolVersion, fragment: Vec<u8>) -> Self {
        Self {
            content_type,
            version,
            fragment,
        }
    }

    /// Get the encoded record length (including header).
    pub fn len(&self) -> usize {
        RECORD_HEADER_SIZE + self.fragment.len()
    }

    /// Check if the fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }

    /// Encode the record to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.fragment.len() > MAX_FRAGMENT_SIZE {
            return Err(Error::RecordOverflow);
        }

        let mut buf = Vec::with_capacity(self.len());
        buf.push(self.content_type.to_u8());
        buf.extend_from_slice(&self.version.to_u16().to_be_bytes());
        buf.extend_from_slice(&(self.fragment.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.fragment);
        Ok(buf)
    }

    /// Decode a record from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < RECORD_HEADER_SIZE {
            return Err(Error::DecodeError("record too short".into()));
        }

        let content_type = ContentType::from_u8(data[0])
            .ok_or_else(|| Error::DecodeError(format!("invalid content type {}", data[0])))?;

        let version_raw = u16::from_be_bytes([data[1], data[2]]);
        let version = ProtocolVersion::from_u16(version_raw).ok_or_else(|| {
            Error::DecodeError(format!("invalid record version 0x{:04x}", version_raw))
        })?;

        let length = u16::from_be_bytes([data[3], data[4]]) as usize;
        if length > MAX_CIPHERTEXT_SIZE {
            return Err(Error::RecordOverflow);
        }
        if data.len() < RECORD_HEADER_SIZE + length {
            return Err(Error::DecodeError("incomplete record".into()));
        }

        let fragment = data[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + length].to_vec();

        Ok(Self {
            content_type,
            version,
            fragment,
        })
    }
}

/// Split `data` into record-sized fragments.
///
/// Handshake messages longer than the fragment limit span multiple
/// records; the receiver reassembles them before dispatch.
pub fn fragment(
    content_type: ContentType,
    version: ProtocolVersion,
    data: &[u8],
    max_fragment: usize,
) -> Vec<TlsPlaintext> {
    let limit = max_fragment.min(MAX_FRAGMENT_SIZE).max(1);
    if data.is_empty() {
        return vec![TlsPlaintext::new(content_type, version, Vec::new())];
    }
    data.chunks(limit)
        .map(|chunk| TlsPlaintext::new(content_type, version, chunk.to_vec()))
        .collect()
}

/// Reassembly buffer for handshake messages spanning records.
///
/// Records of type `handshake` are appended; complete messages (4-byte
/// header plus body) are drained in wire order.
#[derive(Debug, Default)]
pub struct HandshakeReassembler {
    buffer: Vec<u8>,
}

impl HandshakeReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handshake record fragment.
    pub fn push(&mut self, fragment: &[u8]) {
        self.buffer.extend_from_slice(fragment);
    }

    /// Pop the next complete handshake message, if present.
    ///
    /// Returns the full encoded message including its 4-byte header.
    pub fn next_message(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let length =
            ((self.buffer[1] as usize) << 16) | ((self.buffer[2] as usize) << 8) | self.buffer[3] as usize;
        if self.buffer.len() < 4 + length {
            return Ok(None);
        }
        let message: Vec<u8> = self.buffer.drain(..4 + length).collect();
        Ok(Some(message))
    }

    /// Check whether a partial message is pending.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_encode_decode() {
        let record = TlsPlaintext::new(
            ContentType::Handshake,
            ProtocolVersion::Tls12,
            vec![1, 2, 3, 4],
        );
        let encoded = record.encode().unwrap();
        assert_eq!(encoded.len(), RECORD_HEADER_SIZE + 4);
        assert_eq!(encoded[..5], [22, 3, 3, 0, 4]);

        let decoded = TlsPlaintext::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_oversize_fragment_rejected() {
        let record = TlsPlaintext::new(
            ContentType::ApplicationData,
            ProtocolVersion::Tls12,
            vec![0u8; MAX_FRAGMENT_SIZE + 1],
        );
        assert_eq!(record.encode(), Err(Error::RecordOverflow));
    }

    #[test]
    fn test_fragmentation_roundtrip() {
        let data = vec![0x5Au8; 40000];
        let records = fragment(
            ContentType::Handshake,
            ProtocolVersion::Tls12,
            &data,
            MAX_FRAGMENT_SIZE,
        );
        assert_eq!(records.len(), 3);
        let total: usize = records.iter().map(|r| r.fragment.len()).sum();
        assert_eq!(total, data.len());
        assert!(records.iter().all(|r| r.fragment.len() <= MAX_FRAGMENT_SIZE));
    }

    #[test]
    fn test_invalid_record() {
        assert!(TlsPlaintext::decode(&[1, 2, 3]).is_err());
        assert!(TlsPlaintext::decode(&[255, 3, 3, 0, 0]).is_err());
        // version 0x0302 never appears in TLS 1.3
        assert!(TlsPlaintext::decode(&[22, 3, 2, 0, 0]).is_err());
    }

    #[test]
    fn test_reassembler_spanning_messages() {
        let mut reassembler = HandshakeReassembler::new();

        // One message split across two fragments: type 20, length 5.
        reassembler.push(&[20, 0, 0, 5, 0xAA, 0xBB]);
        assert!(reassembler.next_message().unwrap().is_none());
        reassembler.push(&[0xCC, 0xDD, 0xEE]);

        let message = reassembler.next_message().unwrap().unwrap();
        assert_eq!(message, vec![20, 0, 0, 5, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        assert!(!reassembler.has_partial());
    }

    #[test]
    fn test_reassembler_two_messages_in_one_fragment() {
        let mut reassembler = HandshakeReassembler::new();
        reassembler.push(&[20, 0, 0, 1, 0x01, 24, 0, 0, 1, 0x00]);
        assert_eq!(
            reassembler.next_message().unwrap().unwrap(),
            vec![20, 0, 0, 1, 0x01]
        );
        assert_eq!(
            reassembler.next_message().unwrap().unwrap(),
            vec![24, 0, 0, 1, 0x00]
        );
        assert!(reassembler.next_message().unwrap().is_none());
    }
}
