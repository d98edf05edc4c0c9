//! TLS 1.3 handshake messages.
//!
//! Each message has an encode/decode pair over its body; the 4-byte
//! handshake framing (one-byte type, 24-bit length) is handled by
//! [`HandshakeMessage`].

pub mod certificate;
pub mod certificate_request;
pub mod certificate_verify;
pub mod client_hello;
pub mod encrypted_extensions;
pub mod end_of_early_data;
pub mod finished;
pub mod key_update;
pub mod new_session_ticket;
pub mod server_hello;

pub use certificate::{Certificate, CertificateEntry};
pub use certificate_request::CertificateRequest;
pub use certificate_verify::CertificateVerify;
pub use client_hello::ClientHello;
pub use encrypted_extensions::EncryptedExtensions;
pub use end_of_early_data::EndOfEarlyData;
pub use finished::Finished;
pub use key_update::{KeyUpdate, KeyUpdateRequest};
pub use new_session_ticket::NewSessionTicket;
pub use server_hello::{ServerHello, HELLO_RETRY_REQUEST_RANDOM};

use crate::codec::{put_u24, Reader};
use crate::error::{Error, Result};
use crate::protocol::HandshakeType;

/// A framed handshake message.
///
/// ```text
/// struct {
///     HandshakeType msg_type;
///     uint24 length;
///     select (Handshake.msg_type) { ... };
/// } Handshake;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    /// Message type
    pub msg_type: HandshakeType,

    /// Message body
    pub payload: Vec<u8>,
}

impl HandshakeMessage {
    /// Create a new handshake message.
    pub fn new(msg_type: HandshakeType, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// Encode with the 4-byte header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(4 + self.payload.len());
        buf.push(self.msg_type.to_u8());
        put_u24(&mut buf, self.payload.len())?;
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    /// Decode one complete framed message. The input must contain
    /// exactly one message.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let type_raw = reader.take_u8()?;
        let msg_type = HandshakeType::from_u8(type_raw)
            .ok_or_else(|| Error::DecodeError(format!("unknown handshake type {}", type_raw)))?;

        let payload = reader.take_vec24()?.to_vec();
        reader.expect_end("handshake message")?;

        Ok(Self { msg_type, payload })
    }
}
