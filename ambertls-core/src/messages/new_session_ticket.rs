//! NewSessionTicket message (RFC 8446 Section 4.6.1).

use crate::codec::Reader;
use crate::error::{Error, Result};
use crate::extension_types::{decode_early_data, ExtensionContext};
use crate::extensions::Extensions;
use crate::protocol::ExtensionType;
use bytes::{BufMut, BytesMut};

/// Maximum ticket_lifetime the protocol permits (7 days).
pub const MAX_TICKET_LIFETIME_SECS: u32 = 604_800;

/// NewSessionTicket message.
///
/// ```text
/// struct {
///     uint32 ticket_lifetime;
///     uint32 ticket_age_add;
///     opaque ticket_nonce<0..255>;
///     opaque ticket<1..2^16-1>;
///     Extension extensions<0..2^16-2>;
/// } NewSessionTicket;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSessionTicket {
    /// Ticket lifetime in seconds, at most seven days
    pub ticket_lifetime: u32,

    /// Random value added to the ticket age in the PSK identity
    pub ticket_age_add: u32,

    /// Per-ticket nonce fed into the PSK derivation
    pub ticket_nonce: Vec<u8>,

    /// Opaque ticket; the server chooses the encoding
    pub ticket: Vec<u8>,

    /// Extensions (early_data carries max_early_data_size)
    pub extensions: Extensions,
}

impl NewSessionTicket {
    /// Encode the body to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.ticket_nonce.len() > 255 {
            return Err(Error::InternalError("ticket nonce too long".to_string()));
        }
        if self.ticket.is_empty() || self.ticket.len() > 0xFFFF {
            return Err(Error::InternalError("invalid ticket length".to_string()));
        }

        let mut buf = BytesMut::new();
        buf.put_u32(self.ticket_lifetime);
        buf.put_u32(self.ticket_age_add);
        buf.put_u8(self.ticket_nonce.len() as u8);
        buf.put_slice(&self.ticket_nonce);
        buf.put_u16(self.ticket.len() as u16);
        buf.put_slice(&self.ticket);
        buf.put_slice(&self.extensions.encode());
        Ok(buf.to_vec())
    }

    /// Decode the body from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let ticket_lifetime = reader.take_u32()?;
        if ticket_lifetime > MAX_TICKET_LIFETIME_SECS {
            return Err(Error::IllegalParameter(format!(
                "ticket_lifetime {} exceeds seven days",
                ticket_lifetime
            )));
        }

        let ticket_age_add = reader.take_u32()?;
        let ticket_nonce = reader.take_vec8()?.to_vec();
        let ticket = reader.take_vec16()?.to_vec();
        if ticket.is_empty() {
            return Err(Error::DecodeError("empty ticket".into()));
        }

        let extensions = Extensions::decode(&mut reader)?;
        reader.expect_end("NewSessionTicket")?;

        Ok(Self {
            ticket_lifetime,
            ticket_age_add,
            ticket_nonce,
            ticket,
            extensions,
        })
    }

    /// The max_early_data_size from the early_data extension, if the
    /// ticket permits 0-RTT.
    pub fn max_early_data_size(&self) -> Result<Option<u32>> {
        match self.extensions.get(ExtensionType::EarlyData) {
            Some(ext) => Ok(decode_early_data(ext, ExtensionContext::NewSessionTicket)?),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension_types::early_data_ticket;

    fn ticket() -> NewSessionTicket {
        let mut extensions = Extensions::new();
        extensions.add(early_data_ticket(16384));
        NewSessionTicket {
            ticket_lifetime: 3600,
            ticket_age_add: 0xDEADBEEF,
            ticket_nonce: vec![0, 0, 0, 1],
            ticket: vec![0x5A; 64],
            extensions,
        }
    }

    #[test]
    fn test_new_session_ticket_roundtrip() {
        let message = ticket();
        let decoded = NewSessionTicket::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.max_early_data_size().unwrap(), Some(16384));
    }

    #[test]
    fn test_lifetime_cap_enforced() {
        let mut message = ticket();
        message.ticket_lifetime = MAX_TICKET_LIFETIME_SECS + 1;
        assert!(NewSessionTicket::decode(&message.encode().unwrap()).is_err());
    }

    #[test]
    fn test_no_early_data_extension() {
        let mut message = ticket();
        message.extensions = Extensions::new();
        let decoded = NewSessionTicket::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded.max_early_data_size().unwrap(), None);
    }
}
